//! Hook invocation.
//!
//! A node's payload is moved out of its slot for the duration of a hook and
//! put back afterwards, so the hook can hold `&mut self` and `&mut Runtime`
//! at once. While it is out the node is listed in `Runtime::active`.

use std::any::Any;
use std::rc::Rc;

use engine_graph::NodeId;
use tracing::error;

use crate::context::NodeContext;
use crate::error::RuntimeError;
use crate::hooks::{HookResult, HookTable, Phase};
use crate::input::InputEdge;
use crate::node::LifecycleState;
use crate::runtime::Runtime;

impl Runtime {
    pub(crate) fn call_hook<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn Any, &mut NodeContext<'_>) -> R,
    ) -> Result<R, RuntimeError> {
        let entry = self.tree.get_mut(id).ok_or(RuntimeError::Stale(id))?;
        let mut value = entry.value.take().ok_or(RuntimeError::Busy(id))?;

        self.active.push(id);
        let result = f(&mut *value, &mut NodeContext::new(self, id));
        self.active.pop();

        if let Some(entry) = self.tree.get_mut(id) {
            entry.value = Some(value);
        }
        Ok(result)
    }

    fn table(&self, id: NodeId) -> Option<Rc<HookTable>> {
        self.tree.get(id).map(|entry| Rc::clone(&entry.table))
    }

    fn record_failure(&mut self, id: NodeId, table: &HookTable, phase: Phase, err: &anyhow::Error) {
        self.hook_failures += 1;
        let message = format!("{err:#}");
        error!(
            node = %id,
            node_type = table.type_name(),
            %phase,
            error = %message,
            "hook failed"
        );
    }

    fn settle(
        &mut self,
        id: NodeId,
        table: &HookTable,
        phase: Phase,
        result: Result<HookResult, RuntimeError>,
    ) -> HookResult {
        let result = result.unwrap_or_else(|err| Err(err.into()));
        if let Err(err) = &result {
            self.record_failure(id, table, phase, err);
        }
        result
    }

    fn run_plain(&mut self, id: NodeId, phase: Phase) -> HookResult {
        let Some(table) = self.table(id) else {
            return Ok(());
        };
        let mut first = None;
        for hook in table.plain(phase) {
            let result = self.call_hook(id, |value, ctx| hook(value, ctx));
            if let Err(err) = self.settle(id, &table, phase, result) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Run Init hooks, returning the first failure after running them all.
    pub(crate) fn run_init(&mut self, id: NodeId) -> HookResult {
        self.run_plain(id, Phase::Init)
    }

    pub(crate) fn run_destroy(&mut self, id: NodeId) {
        let _ = self.run_plain(id, Phase::Destroy);
    }

    pub(crate) fn run_invalidate(&mut self, id: NodeId) {
        let _ = self.run_plain(id, Phase::Invalidate);
    }

    pub(crate) fn run_update(&mut self, id: NodeId, dt: f64) {
        let Some(table) = self.table(id) else {
            return;
        };
        for hook in &table.update {
            if !self.tree.contains(id) {
                break;
            }
            let result = self.call_hook(id, |value, ctx| hook(value, ctx, dt));
            let _ = self.settle(id, &table, Phase::Update, result);
        }
    }

    pub(crate) fn run_timers(&mut self, id: NodeId, dt: f64) {
        let Some(table) = self.table(id) else {
            return;
        };
        let fired: Vec<u32> = match self.tree.get_mut(id) {
            Some(entry) => entry.timers.iter_mut().map(|timer| timer.advance(dt)).collect(),
            None => return,
        };
        for (timer, count) in table.timers.iter().zip(fired) {
            for _ in 0..count {
                if !self.tree.contains(id) {
                    return;
                }
                let result = self.call_hook(id, |value, ctx| (timer.hook)(value, ctx, dt));
                let _ = self.settle(id, &table, Phase::Timer, result);
            }
        }
    }

    fn accepts_dispatch(&self, id: NodeId) -> bool {
        self.tree.is_attached(id)
            && self.tree.get(id).is_some_and(|entry| {
                !entry.destroying && entry.state == LifecycleState::Initialized
            })
    }

    pub(crate) fn dispatch_input(&mut self, dt: f64) {
        for binding in self.input.take_edges() {
            for target in self.router.targets(binding) {
                if !self.accepts_dispatch(target) {
                    continue;
                }
                let Some(table) = self.table(target) else {
                    continue;
                };
                let delta = match binding.edge {
                    InputEdge::Held => dt * self.effective_time_scale(target),
                    InputEdge::Pressed | InputEdge::Released => 0.0,
                };
                for input in table.inputs.iter().filter(|input| input.binding == binding) {
                    if !self.tree.contains(target) {
                        break;
                    }
                    let result =
                        self.call_hook(target, |value, ctx| (input.hook)(value, ctx, delta));
                    let _ = self.settle(target, &table, Phase::Input, result);
                }
            }
        }
    }

    pub(crate) fn deliver_signals(&mut self) {
        for signal in self.signals.take_batch() {
            for target in self.signals.recipients(&signal) {
                if !self.accepts_dispatch(target) {
                    continue;
                }
                let Some(table) = self.table(target) else {
                    continue;
                };
                for entry in table.signals.iter().filter(|entry| entry.signal == signal.id) {
                    if !self.tree.contains(target) {
                        break;
                    }
                    let result =
                        self.call_hook(target, |value, ctx| (entry.hook)(value, ctx, &signal));
                    let _ = self.settle(target, &table, Phase::Signal, result);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::hooks::Hooks;
    use crate::input::ActionId;
    use crate::node::{Handle, Node};
    use crate::signal::{Signal, SignalId};

    use super::*;

    thread_local! {
        static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn log(entry: impl Into<String>) {
        LOG.with(|log| log.borrow_mut().push(entry.into()));
    }

    fn take_log() -> Vec<String> {
        LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
    }

    #[derive(Default)]
    struct Stage;
    impl Node for Stage {}

    struct Named(&'static str);

    impl Node for Named {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks
                .on_init(|node, _| {
                    log(format!("init {}", node.0));
                    Ok(())
                })
                .on_update(|node, _, _| {
                    log(format!("update {}", node.0));
                    Ok(())
                })
                .on_destroy(|node, _| {
                    log(format!("destroy {}", node.0));
                    Ok(())
                });
        }
    }

    #[derive(Default)]
    struct Faulty {
        updates: u32,
    }

    impl Node for Faulty {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks
                .on_update(|_, _, _| anyhow::bail!("boom"))
                .on_update(|node, _, _| {
                    node.updates += 1;
                    Ok(())
                });
        }
    }

    struct Broken;

    impl Node for Broken {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_init(|_, _| anyhow::bail!("missing config"));
        }
    }

    #[derive(Default)]
    struct Ticker {
        seconds: u32,
        frames: u32,
    }

    impl Node for Ticker {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks
                .every_seconds(1.0, |node, _, _| {
                    node.seconds += 1;
                    Ok(())
                })
                .every_frames(3, |node, _, _| {
                    node.frames += 1;
                    Ok(())
                });
        }
    }

    const JUMP: ActionId = ActionId(7);

    #[derive(Default)]
    struct Jumper {
        pressed: u32,
        held: f64,
        released: u32,
    }

    impl Node for Jumper {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks
                .on_input(JUMP, InputEdge::Pressed, |node, _, _| {
                    node.pressed += 1;
                    Ok(())
                })
                .on_input(JUMP, InputEdge::Held, |node, _, dt| {
                    node.held += dt;
                    Ok(())
                })
                .on_input(JUMP, InputEdge::Released, |node, _, _| {
                    node.released += 1;
                    Ok(())
                });
        }
    }

    const SCORE: SignalId = SignalId::from_name("score");

    #[derive(Default)]
    struct Scoreboard {
        total: u32,
    }

    impl Node for Scoreboard {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_signal(SCORE, |node, _, signal| {
                node.total += signal.payload::<u32>().copied().unwrap_or(1);
                Ok(())
            });
        }
    }

    fn stage(rt: &mut Runtime) -> Handle<Stage> {
        rt.create_backstage(Stage).unwrap()
    }

    #[test]
    fn test_init_top_down_destroy_bottom_up() {
        take_log();
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let parent = rt.spawn(Named("parent"));
        rt.create_child(parent, Named("child")).unwrap();
        assert!(take_log().is_empty());

        rt.adopt_child(root, parent).unwrap();
        assert_eq!(take_log(), vec!["init parent", "init child"]);

        rt.process_logic_frame(0.016).unwrap();
        assert_eq!(take_log(), vec!["update parent", "update child"]);

        rt.free_immediately(parent).unwrap();
        assert_eq!(take_log(), vec!["destroy child", "destroy parent"]);
        assert!(!rt.is_valid(parent));

        rt.free_immediately(root).unwrap();
        assert!(take_log().is_empty());
    }

    #[test]
    fn test_failing_hook_is_isolated() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let faulty = rt.create_child(root, Faulty::default()).unwrap();

        let report = rt.process_logic_frame(0.016).unwrap();
        assert_eq!(report.hook_failures, 1);
        let report = rt.process_logic_frame(0.016).unwrap();
        assert_eq!(report.hook_failures, 1);
        assert_eq!(rt.node(faulty).unwrap().updates, 2);
        assert_eq!(rt.hook_failures(), 2);
    }

    #[test]
    fn test_failing_root_init_tears_down() {
        let mut rt = Runtime::new();
        let err = rt.create_backstage(Broken).unwrap_err();
        assert!(matches!(err, RuntimeError::Initialization { .. }));
        assert!(err.to_string().contains("missing config"));
        assert!(rt.roots().is_empty());
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn test_failing_child_init_is_returned_and_discarded() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let before = rt.node_count();
        let err = rt.create_child(root, Broken).unwrap_err();
        assert!(matches!(err, RuntimeError::Initialization { .. }));
        assert_eq!(rt.node_count(), before);
        assert!(rt.process_logic_frame(0.016).is_ok());
    }

    #[test]
    fn test_timers_fire_on_threshold() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let ticker = rt.create_child(root, Ticker::default()).unwrap();
        for _ in 0..10 {
            rt.process_logic_frame(0.1).unwrap();
        }
        assert_eq!(rt.node(ticker).unwrap().seconds, 1);
        assert_eq!(rt.node(ticker).unwrap().frames, 3);

        let other = rt.create_child(root, Ticker::default()).unwrap();
        rt.process_logic_frame(0.5).unwrap();
        rt.process_logic_frame(0.5).unwrap();
        assert_eq!(rt.node(other).unwrap().seconds, 1);
    }

    #[test]
    fn test_time_scale_is_inherited() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let parent = rt.create_child(root, Stage).unwrap();
        let ticker = rt.create_child(parent, Ticker::default()).unwrap();
        rt.set_time_scale(parent, 0.5).unwrap();
        assert_eq!(rt.effective_time_scale(ticker), 0.5);

        rt.process_logic_frame(1.0).unwrap();
        assert_eq!(rt.node(ticker).unwrap().seconds, 0);
        rt.process_logic_frame(1.0).unwrap();
        assert_eq!(rt.node(ticker).unwrap().seconds, 1);
    }

    #[test]
    fn test_input_edges_reach_subscribers() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let jumper = rt.create_child(root, Jumper::default()).unwrap();

        rt.input_mut().press(JUMP);
        rt.process_logic_frame(0.25).unwrap();
        rt.process_logic_frame(0.25).unwrap();
        rt.input_mut().release(JUMP);
        rt.process_logic_frame(0.25).unwrap();

        let node = rt.node(jumper).unwrap();
        assert_eq!(node.pressed, 1);
        assert_eq!(node.held, 0.5);
        assert_eq!(node.released, 1);
        assert!(!rt.input().is_held(JUMP));
    }

    #[test]
    fn test_signals_are_delivered_after_update() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let a = rt.create_child(root, Scoreboard::default()).unwrap();
        let b = rt.create_child(root, Scoreboard::default()).unwrap();

        rt.emit(Signal::new(SCORE).with_payload(5_u32));
        let sender = rt.signal_sender();
        std::thread::spawn(move || sender.send(Signal::new(SCORE).to(b)))
            .join()
            .unwrap();
        rt.process_logic_frame(0.016).unwrap();

        assert_eq!(rt.node(a).unwrap().total, 5);
        assert_eq!(rt.node(b).unwrap().total, 6);

        rt.free_immediately(a).unwrap();
        rt.emit(Signal::new(SCORE));
        rt.process_logic_frame(0.016).unwrap();
        assert_eq!(rt.node(b).unwrap().total, 7);
    }

    #[test]
    fn test_own_payload_is_busy_inside_hook() {
        let mut rt = Runtime::new();
        let root = stage(&mut rt);
        let node = rt.create_child(root, Faulty::default()).unwrap();
        let busy = rt
            .with_node(node, |_, ctx| matches!(ctx.node(node), Err(RuntimeError::Busy(_))))
            .unwrap();
        assert!(busy);
        assert!(rt.node(node).is_ok());
    }
}
