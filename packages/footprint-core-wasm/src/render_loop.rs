use std::cell::Cell;
use std::rc::Rc;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};

use crate::map_sync::{MapCameraSynchronizer, MapMoveReceiver};
use crate::scene::{PipelineContext, Renderer};
use crate::{console_error, console_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Ticks from the host's frame scheduler (`requestAnimationFrame` in a browser).
pub type FrameSender = UnboundedSender<()>;
pub type FrameReceiver = UnboundedReceiver<()>;

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded()
}

/// Stops a running loop from outside, e.g. from a JS callback.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    state: Rc<Cell<LoopState>>,
}

impl LoopHandle {
    pub fn stop(&self) {
        self.state.set(LoopState::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == LoopState::Running
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events_applied: usize,
    pub rendered: bool,
}

pub struct RenderLoop {
    state: Rc<Cell<LoopState>>,
    sync: Option<(MapCameraSynchronizer, MapMoveReceiver)>,
    frames: u64,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            state: Rc::new(Cell::new(LoopState::Stopped)),
            sync: None,
            frames: 0,
        }
    }

    /// Follow map movements: queued events are applied to the camera before each frame.
    pub fn with_map_sync(mut self, sync: MapCameraSynchronizer, events: MapMoveReceiver) -> Self {
        self.sync = Some((sync, events));
        self
    }

    pub fn start(&mut self) -> LoopHandle {
        self.state.set(LoopState::Running);
        self.handle()
    }

    pub fn stop(&mut self) {
        self.state.set(LoopState::Stopped);
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            state: Rc::clone(&self.state),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn synchronizer(&self) -> Option<&MapCameraSynchronizer> {
        self.sync.as_ref().map(|(sync, _)| sync)
    }

    /// One iteration: apply pending map events, then draw. Never blocks, and no error
    /// escapes; failures are logged and the next frame proceeds as usual.
    pub fn tick<R: Renderer>(&mut self, ctx: &mut PipelineContext<R>) -> TickReport {
        let mut report = TickReport::default();
        if self.state.get() != LoopState::Running {
            return report;
        }

        if let Some((sync, events)) = self.sync.as_mut() {
            // Err means the queue is empty, Ok(None) that the map side is gone
            while let Ok(Some(event)) = events.try_next() {
                match sync.handle_move(event, ctx.camera_mut()) {
                    Ok(_) => report.events_applied += 1,
                    Err(err) => console_warn!("Ignoring map move: {}", err),
                }
            }
        }

        match ctx.render_frame() {
            Ok(()) => {
                self.frames += 1;
                report.rendered = true;
            }
            Err(err) => console_error!("Render failed: {}", err),
        }

        report
    }

    /// Tick once per frame until stopped or until the frame source ends. Returns the
    /// number of frames drawn.
    pub async fn drive<R, S>(&mut self, ctx: &mut PipelineContext<R>, mut frames: S) -> u64
    where
        R: Renderer,
        S: Stream<Item = ()> + Unpin,
    {
        let start = self.frames;
        while self.state.get() == LoopState::Running {
            if frames.next().await.is_none() {
                break;
            }
            self.tick(ctx);
        }
        self.frames - start
    }
}
