//! Ordered frame stages and the named callbacks registered on them
//!
//! The pipeline is the seam an external frame loop drives through
//! [`World::tick`](crate::world::World::tick). `OnStart` runs once before the
//! first frame, the frame stages run in [`Stage::FRAME`] order on every tick,
//! and `OnQuit` runs once after a quit request.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
#[cfg(feature = "profiling")]
use tracing::info_span;
use tracing::{debug, trace};

use crate::error::{EcsError, Result};
use crate::world::World;

/// Named pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    OnStart,
    OnLoad,
    PostLoad,
    PreUpdate,
    OnUpdate,
    OnValidate,
    PreRender,
    Render,
    UiRender,
    PostRender,
    OnQuit,
}

impl Stage {
    /// Stages run on every tick, in order
    pub const FRAME: [Stage; 9] = [
        Stage::OnLoad,
        Stage::PostLoad,
        Stage::PreUpdate,
        Stage::OnUpdate,
        Stage::OnValidate,
        Stage::PreRender,
        Stage::Render,
        Stage::UiRender,
        Stage::PostRender,
    ];

    /// Runs at most once per pipeline
    pub fn is_one_shot(self) -> bool {
        matches!(self, Stage::OnStart | Stage::OnQuit)
    }
}

/// Callback invoked with exclusive access to the world
pub type StageCallback = Box<dyn FnMut(&mut World) + Send>;

type CallbackSlot = u64;

struct Registered {
    slot: CallbackSlot,
    name: String,
    /// `None` while the callback itself is running
    callback: Option<StageCallback>,
    /// Cleared for callbacks registered mid-tick until that tick ends
    armed: bool,
}

/// Registered callbacks per stage, in registration order
#[derive(Default)]
pub struct Pipeline {
    callbacks: FxHashMap<Stage, Vec<Registered>>,
    next_slot: CallbackSlot,
    running: bool,
    started: bool,
    quit_ran: bool,
    frames: u64,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`. A callback already registered under
    /// the same name and stage is replaced in place.
    ///
    /// During a tick the new callback is held back until the next tick.
    pub fn register(&mut self, name: impl Into<String>, stage: Stage, callback: StageCallback) {
        let name = name.into();
        let slot = self.next_slot;
        self.next_slot += 1;
        let armed = !self.running;
        let list = self.callbacks.entry(stage).or_default();
        let entry = Registered {
            slot,
            name,
            callback: Some(callback),
            armed,
        };
        match list.iter_mut().find(|existing| existing.name == entry.name) {
            Some(existing) => *existing = entry,
            None => list.push(entry),
        }
    }

    /// Remove the callback registered under `name`. Works from inside a
    /// running callback, including the callback being removed.
    pub fn deregister(&mut self, name: &str, stage: Stage) -> Result<()> {
        let list = self.callbacks.get_mut(&stage);
        let position = list
            .as_ref()
            .and_then(|list| list.iter().position(|existing| existing.name == name));
        match (list, position) {
            (Some(list), Some(position)) => {
                list.remove(position);
                Ok(())
            }
            _ => Err(EcsError::CallbackNotFound {
                name: name.to_string(),
                stage,
            }),
        }
    }

    pub fn contains(&self, name: &str, stage: Stage) -> bool {
        self.callbacks
            .get(&stage)
            .is_some_and(|list| list.iter().any(|existing| existing.name == name))
    }

    /// Callback names of `stage` in execution order
    pub fn names(&self, stage: Stage) -> Vec<&str> {
        self.callbacks
            .get(&stage)
            .map(|list| list.iter().map(|entry| entry.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    /// Completed frames
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// True while [`Pipeline::tick`] is running callbacks
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn armed_slots(&self, stage: Stage) -> SmallVec<[CallbackSlot; 8]> {
        self.callbacks
            .get(&stage)
            .map(|list| {
                list.iter()
                    .filter(|entry| entry.armed)
                    .map(|entry| entry.slot)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn entry_mut(&mut self, stage: Stage, slot: CallbackSlot) -> Option<&mut Registered> {
        self.callbacks
            .get_mut(&stage)?
            .iter_mut()
            .find(|entry| entry.slot == slot)
    }

    fn begin_tick(&mut self) {
        self.running = true;
    }

    fn end_tick(&mut self) {
        self.running = false;
        for entry in self.callbacks.values_mut().flatten() {
            entry.armed = true;
        }
    }

    /// Run every armed callback of `stage`. Each callback is lifted out of
    /// the pipeline for the duration of its call and put back afterwards,
    /// unless it was deregistered or replaced meanwhile.
    fn run_stage(world: &mut World, stage: Stage) {
        for slot in world.pipeline_mut().armed_slots(stage) {
            let taken = world
                .pipeline_mut()
                .entry_mut(stage, slot)
                .and_then(|entry| entry.callback.take().map(|cb| (entry.name.clone(), cb)));
            let Some((name, mut callback)) = taken else {
                continue;
            };
            trace!(callback = %name, ?stage, "running callback");
            callback(&mut *world);
            if let Some(entry) = world.pipeline_mut().entry_mut(stage, slot) {
                entry.callback = Some(callback);
            }
        }
    }

    /// Run one frame of `world`'s pipeline. Returns false once the world
    /// requested quit, after running `OnQuit` exactly once.
    pub fn tick(world: &mut World) -> bool {
        #[cfg(feature = "profiling")]
        let _span = info_span!("pipeline.tick", frame = world.frame_count()).entered();

        world.pipeline_mut().begin_tick();
        if !world.quit_requested() {
            if !world.pipeline().started {
                world.pipeline_mut().started = true;
                Self::run_stage(world, Stage::OnStart);
            }
            for stage in Stage::FRAME {
                Self::run_stage(world, stage);
            }
            world.pipeline_mut().frames += 1;
        }

        let running = if world.quit_requested() {
            if !world.pipeline().quit_ran {
                world.pipeline_mut().quit_ran = true;
                debug!(frames = world.frame_count(), "pipeline quitting");
                Self::run_stage(world, Stage::OnQuit);
            }
            false
        } else {
            true
        };
        world.pipeline_mut().end_tick();
        running
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("callbacks", &self.callback_count())
            .field("started", &self.started)
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replaces_same_name() {
        let mut pipeline = Pipeline::new();
        pipeline.register("a", Stage::OnUpdate, Box::new(|_| {}));
        pipeline.register("b", Stage::OnUpdate, Box::new(|_| {}));
        pipeline.register("a", Stage::OnUpdate, Box::new(|_| {}));
        assert_eq!(pipeline.names(Stage::OnUpdate), vec!["a", "b"]);
        assert_eq!(pipeline.callback_count(), 2);
    }

    #[test]
    fn test_deregister_unknown_fails() {
        let mut pipeline = Pipeline::new();
        pipeline.register("a", Stage::Render, Box::new(|_| {}));
        assert!(pipeline.deregister("a", Stage::OnUpdate).is_err());
        assert!(pipeline.deregister("a", Stage::Render).is_ok());
        assert_eq!(
            pipeline.deregister("a", Stage::Render),
            Err(EcsError::CallbackNotFound {
                name: "a".to_string(),
                stage: Stage::Render
            })
        );
    }

    #[test]
    fn test_frame_order() {
        assert!(Stage::FRAME.windows(2).all(|w| w[0] < w[1]));
        assert!(Stage::OnStart.is_one_shot());
        assert!(!Stage::FRAME.iter().any(|s| s.is_one_shot()));
    }

    #[test]
    fn test_callback_can_remove_itself() {
        let mut world = World::new();
        world.register_callback("once", Stage::OnUpdate, |world: &mut World| {
            world.deregister_callback("once", Stage::OnUpdate).unwrap();
        });
        Pipeline::tick(&mut world);
        assert_eq!(world.pipeline().callback_count(), 0);
        assert!(!world.pipeline().is_running());
    }

    #[test]
    fn test_replacing_running_callback_keeps_replacement() {
        let mut world = World::new();
        world.register_callback("swap", Stage::OnLoad, |world: &mut World| {
            world.register_callback("swap", Stage::OnLoad, |_: &mut World| {});
        });
        Pipeline::tick(&mut world);
        assert_eq!(world.pipeline().names(Stage::OnLoad), vec!["swap"]);
        assert_eq!(world.pipeline().callback_count(), 1);
    }
}
