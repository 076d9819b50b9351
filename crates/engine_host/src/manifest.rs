//! JSON world manifests and the compiler that loads them.
//!
//! A manifest names a world and lists its actors. "Compiling" optionally runs
//! a build command (a generator, an exporter) and then parses the manifest;
//! the resulting unit instantiates a [`DemoStage`] backstage with one
//! [`Spinner`] actor per entry.

use std::path::PathBuf;
use std::process::Command;

use engine_math::{Quat, Transform3D};
use engine_runtime::{HookResult, Hooks, Node, NodeContext, NodeId, Runtime, RuntimeError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SlotConfig;
use crate::guest::{CompileError, Compiler, GuestSettings, GuestUnit};

/// A world description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldManifest {
    pub name: String,
    /// Time scale applied to the whole world.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    #[serde(default)]
    pub actors: Vec<ActorSpec>,
}

fn default_time_scale() -> f64 {
    1.0
}

/// One actor in a [`WorldManifest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSpec {
    pub name: String,
    /// Initial local transform.
    #[serde(default)]
    pub transform: Transform3D,
    /// Rotation speed about +Y, in radians per second.
    #[serde(default)]
    pub spin: f32,
    /// Report to the world census every this many seconds.
    #[serde(default)]
    pub pulse_seconds: Option<f64>,
}

impl WorldManifest {
    /// Parse a manifest from JSON text.
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Compiles a guest from a manifest file.
#[derive(Debug, Clone)]
pub struct ManifestCompiler {
    manifest: PathBuf,
    build_command: Option<Vec<String>>,
}

impl ManifestCompiler {
    #[must_use]
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            build_command: None,
        }
    }

    /// Run `command` before each read of the manifest.
    #[must_use]
    pub fn with_build_command(mut self, command: Vec<String>) -> Self {
        self.build_command = Some(command);
        self
    }

    /// The compiler a configured slot asks for.
    #[must_use]
    pub fn from_slot(slot: &SlotConfig) -> Self {
        Self {
            manifest: slot.manifest.clone(),
            build_command: slot.build_command.clone(),
        }
    }

    fn run_build(&self, command: &[String]) -> Result<(), CompileError> {
        let Some((program, args)) = command.split_first() else {
            return Err(CompileError::Build("empty build command".to_string()));
        };
        debug!(program = %program, ?args, "running build command");
        let output = Command::new(program).args(args).output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(CompileError::Build(if stderr.is_empty() {
            format!("{program} exited with {}", output.status)
        } else {
            stderr
        }))
    }
}

impl Compiler for ManifestCompiler {
    fn compile(&self) -> Result<Box<dyn GuestUnit>, CompileError> {
        if let Some(command) = &self.build_command {
            self.run_build(command)?;
        }
        let text = std::fs::read_to_string(&self.manifest)?;
        let manifest = WorldManifest::parse(&text)?;
        info!(
            manifest = %self.manifest.display(),
            world = %manifest.name,
            actors = manifest.actors.len(),
            "compiled world manifest"
        );
        Ok(Box::new(ManifestUnit { manifest }))
    }
}

/// A parsed manifest, ready to instantiate.
#[derive(Debug)]
pub struct ManifestUnit {
    manifest: WorldManifest,
}

impl GuestUnit for ManifestUnit {
    fn describe(&self) -> String {
        format!("{} ({} actors)", self.manifest.name, self.manifest.actors.len())
    }

    fn settings(&self) -> GuestSettings {
        GuestSettings {
            name: self.manifest.name.clone(),
            time_scale: self.manifest.time_scale,
        }
    }

    fn instantiate(&self, runtime: &mut Runtime) -> Result<NodeId, RuntimeError> {
        let stage = runtime.create_backstage(DemoStage {
            name: self.manifest.name.clone(),
            pending: self.manifest.actors.clone(),
            actors: Vec::new(),
        })?;
        Ok(stage.id())
    }
}

/// Root of a manifest world. Spawns its actors during Init.
#[derive(Debug)]
pub struct DemoStage {
    name: String,
    pending: Vec<ActorSpec>,
    actors: Vec<NodeId>,
}

impl DemoStage {
    /// The spawned actors, in manifest order.
    #[must_use]
    pub fn actors(&self) -> &[NodeId] {
        &self.actors
    }

    fn init(&mut self, ctx: &mut NodeContext<'_>) -> HookResult {
        ctx.service::<Census>()?;
        for spec in std::mem::take(&mut self.pending) {
            let actor = ctx.create_actor(Spinner::new(spec))?;
            self.actors.push(actor.id());
        }
        info!(world = %self.name, actors = self.actors.len(), "world ready");
        Ok(())
    }

    fn report(&mut self, ctx: &mut NodeContext<'_>, _dt: f64) -> HookResult {
        let census = ctx.service::<Census>()?;
        let pulses = ctx.node(census)?.pulses;
        debug!(world = %self.name, frame = ctx.frame(), pulses, "world report");
        Ok(())
    }
}

impl Node for DemoStage {
    fn hooks(hooks: &mut Hooks<Self>) {
        hooks.on_init(Self::init).every_seconds(1.0, Self::report);
    }
}

/// A spatial actor that turns about +Y and periodically checks in.
#[derive(Debug)]
pub struct Spinner {
    name: String,
    start: Transform3D,
    spin: f32,
    angle: f32,
    pulse_seconds: Option<f64>,
    since_pulse: f64,
}

impl Spinner {
    fn new(spec: ActorSpec) -> Self {
        Self {
            name: spec.name,
            start: spec.transform,
            spin: spec.spin,
            angle: 0.0,
            pulse_seconds: spec.pulse_seconds,
            since_pulse: 0.0,
        }
    }

    /// Accumulated rotation in radians.
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    fn init(&mut self, ctx: &mut NodeContext<'_>) -> HookResult {
        let id = ctx.id();
        ctx.set_local_transform(id, self.start)?;
        debug!(actor = %self.name, node = %id, "actor placed");
        Ok(())
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>, dt: f64) -> HookResult {
        if self.spin != 0.0 {
            self.angle += self.spin * dt as f32;
            let id = ctx.id();
            ctx.set_rotation(id, self.start.rotation * Quat::from_rotation_y(self.angle))?;
        }

        if let Some(period) = self.pulse_seconds
            && period > 0.0
        {
            self.since_pulse += dt;
            while self.since_pulse >= period {
                self.since_pulse -= period;
                let census = ctx.service::<Census>()?;
                ctx.node_mut(census)?.pulses += 1;
            }
        }
        Ok(())
    }
}

impl Node for Spinner {
    fn hooks(hooks: &mut Hooks<Self>) {
        hooks
            .with_transform(Transform3D::IDENTITY)
            .on_init(Self::init)
            .on_update(Self::update);
    }
}

/// World-scoped pulse counter.
#[derive(Debug, Default)]
pub struct Census {
    pub pulses: u64,
}

impl Node for Census {}

#[cfg(test)]
mod tests {
    use engine_math::Vec3;
    use engine_runtime::Handle;

    use super::*;

    const WORLD: &str = r#"{
        "name": "orbit",
        "time_scale": 2.0,
        "actors": [
            { "name": "sun", "spin": 1.0 },
            {
                "name": "moon",
                "transform": { "position": [4.0, 0.0, 0.0] },
                "pulse_seconds": 0.5
            }
        ]
    }"#;

    fn write_manifest(text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("engine-world-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_parse_defaults() {
        let manifest = WorldManifest::parse(r#"{ "name": "empty" }"#).unwrap();
        assert_eq!(manifest.time_scale, 1.0);
        assert!(manifest.actors.is_empty());

        let manifest = WorldManifest::parse(WORLD).unwrap();
        assert_eq!(manifest.actors[0].transform, Transform3D::IDENTITY);
        assert_eq!(manifest.actors[1].transform.position, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(manifest.actors[1].pulse_seconds, Some(0.5));
    }

    #[test]
    fn test_parse_error_is_manifest_error() {
        assert!(matches!(
            WorldManifest::parse("{ not json"),
            Err(CompileError::Manifest(_))
        ));
    }

    #[test]
    fn test_compile_and_instantiate() {
        let path = write_manifest(WORLD);
        let unit = ManifestCompiler::new(&path).compile().unwrap();
        assert_eq!(unit.describe(), "orbit (2 actors)");
        assert_eq!(unit.settings().time_scale, 2.0);

        let mut rt = Runtime::new();
        let root = unit.instantiate(&mut rt).unwrap();
        rt.set_time_scale(root, unit.settings().time_scale).unwrap();
        let stage = Handle::<DemoStage>::new(root);
        let actors = rt.node(stage).unwrap().actors().to_vec();
        assert_eq!(actors.len(), 2);
        assert!(rt.has_service::<Census>(root));

        let moon = actors[1];
        let world = rt.world_transform(moon).unwrap();
        assert!(world.position.abs_diff_eq(Vec3::new(4.0, 0.0, 0.0), 1e-5));

        for _ in 0..4 {
            rt.process_logic_frame(0.25).unwrap();
        }
        // Four frames of 0.25s at 2x is 2s of world time.
        let sun = rt.node(Handle::<Spinner>::new(actors[0])).unwrap();
        assert!((sun.angle() - 2.0).abs() < 1e-5);
        let census = rt.service::<Census>(root).unwrap();
        assert_eq!(rt.node(census).unwrap().pulses, 4);
        assert_eq!(rt.hook_failures(), 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let compiler = ManifestCompiler::new("/nonexistent/world.json");
        assert!(matches!(compiler.compile(), Err(CompileError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_build_command() {
        let path = write_manifest(WORLD);
        let compiler = ManifestCompiler::new(&path).with_build_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo broken >&2; exit 3".to_string(),
        ]);
        match compiler.compile() {
            Err(CompileError::Build(message)) => assert_eq!(message, "broken"),
            other => panic!("expected build error, got {:?}", other.map(|unit| unit.describe())),
        }

        let compiler = ManifestCompiler::new(&path).with_build_command(Vec::new());
        assert!(matches!(compiler.compile(), Err(CompileError::Build(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
