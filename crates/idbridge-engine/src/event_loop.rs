//! Single-threaded event loop
//!
//! Every request, cursor advance and transaction lifecycle step runs as a task
//! on one dedicated thread, and every listener is invoked from that thread.
//! Tasks run one at a time while holding the loop's turn lock; a caller that
//! takes a [`Turn`] therefore knows no event is delivered until it lets go.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, error};

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the loop thread's task queue.
pub(crate) struct EventLoop {
    tasks: mpsc::UnboundedSender<Task>,
    turn: Arc<Mutex<()>>,
}

impl EventLoop {
    /// Spawn the loop thread. It exits once every handle has been dropped and
    /// the queue has drained.
    pub(crate) fn start() -> std::io::Result<Self> {
        let (tasks, mut queue) = mpsc::unbounded_channel::<Task>();
        let turn = Arc::new(Mutex::new(()));
        let loop_turn = Arc::clone(&turn);

        thread::Builder::new()
            .name("idbridge-events".into())
            .spawn(move || {
                while let Some(task) = queue.blocking_recv() {
                    let _turn = loop_turn.lock();
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        error!("event listener panicked; continuing with the next task");
                    }
                }
                debug!("event loop stopped");
            })?;

        Ok(Self { tasks, turn })
    }

    /// Queue a task. Tasks run in FIFO order.
    pub(crate) fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        if self.tasks.send(Box::new(task)).is_err() {
            debug!("event loop is gone; dropping task");
        }
    }

    pub(crate) fn turn(&self) -> Turn<'_> {
        Turn {
            _guard: self.turn.lock(),
        }
    }
}

/// A synchronous turn on the event loop.
///
/// While a turn is held no task runs and no listener fires. Issue a request
/// and attach its listeners inside one turn so the terminal event cannot be
/// delivered before anyone is listening. Never take a turn from inside a
/// listener: listeners already run inside the loop's own turn.
pub struct Turn<'a> {
    _guard: MutexGuard<'a, ()>,
}
