//! Off-thread asset loading.
//!
//! Loads run on tokio's blocking pool and report back as an [`ASSET_LOADED`]
//! signal addressed to the requesting node, so the result is handled on the
//! logic thread during the normal signal phase.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use engine_graph::NodeId;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::runtime::Runtime;
use crate::signal::{Signal, SignalId};

/// Signal sent when a requested asset finished loading.
pub const ASSET_LOADED: SignalId = SignalId::from_name("asset.loaded");

/// The asset backend.
pub trait AssetSource: Send + Sync + 'static {
    /// Read an asset. Called on a blocking worker thread.
    fn load(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads assets from a directory.
#[derive(Debug, Clone)]
pub struct FsAssets {
    root: PathBuf,
}

impl FsAssets {
    /// Serve files below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FsAssets {
    fn load(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let full = self.root.join(path);
        std::fs::read(&full).with_context(|| format!("reading {}", full.display()))
    }
}

/// Payload of an [`ASSET_LOADED`] signal.
#[derive(Debug, Clone)]
pub struct AssetLoaded {
    /// The requested path.
    pub path: String,
    /// The bytes, or the rendered load error.
    pub result: Result<Arc<Vec<u8>>, String>,
}

impl Runtime {
    /// Load `path` from `source` on the blocking pool of `tokio` and deliver
    /// the result to `requester` as an [`ASSET_LOADED`] signal.
    pub fn request_asset(
        &self,
        tokio: &TokioHandle,
        source: Arc<dyn AssetSource>,
        path: impl Into<String>,
        requester: impl Into<NodeId>,
    ) -> JoinHandle<()> {
        let path = path.into();
        let requester = requester.into();
        let sender = self.signal_sender();
        debug!(path = %path, node = %requester, "asset requested");
        tokio.spawn_blocking(move || {
            let result = source
                .load(&path)
                .map(Arc::new)
                .map_err(|err| format!("{err:#}"));
            let signal = Signal::new(ASSET_LOADED)
                .to(requester)
                .with_payload(AssetLoaded { path, result });
            sender.send(signal);
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::hooks::Hooks;
    use crate::node::Node;

    use super::*;

    #[derive(Default)]
    struct Stage;
    impl Node for Stage {}

    #[derive(Default)]
    struct Loader {
        loaded: Option<Result<usize, String>>,
    }

    impl Node for Loader {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_signal(ASSET_LOADED, |loader, _, signal| {
                let done = signal
                    .payload::<AssetLoaded>()
                    .ok_or_else(|| anyhow::anyhow!("missing payload"))?;
                loader.loaded = Some(done.result.clone().map(|bytes| bytes.len()));
                Ok(())
            });
        }
    }

    #[tokio::test]
    async fn test_asset_arrives_as_signal() {
        let dir = std::env::temp_dir().join(format!("engine-assets-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("mesh.bin"), [1_u8, 2, 3]).unwrap();
        let source: Arc<dyn AssetSource> = Arc::new(FsAssets::new(&dir));

        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let found = rt.create_child(stage, Loader::default()).unwrap();
        let missing = rt.create_child(stage, Loader::default()).unwrap();

        let tokio = TokioHandle::current();
        rt.request_asset(&tokio, Arc::clone(&source), "mesh.bin", found)
            .await
            .unwrap();
        rt.request_asset(&tokio, source, "absent.bin", missing)
            .await
            .unwrap();
        rt.process_logic_frame(0.016).unwrap();

        assert_eq!(rt.node(found).unwrap().loaded, Some(Ok(3)));
        assert!(matches!(rt.node(missing).unwrap().loaded, Some(Err(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
