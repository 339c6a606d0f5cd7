//! Fan-out/fan-in supervision of concurrent actors.

use crate::error::{ReloadError, Result};
use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

type Execute = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type Interrupt = Box<dyn FnOnce() + Send>;

struct Actor {
    name: String,
    execute: Execute,
    interrupt: Interrupt,
}

/// A group of actors that start together and stop together.
///
/// Each actor is an `execute` future paired with an `interrupt` function that makes
/// it return. When the first actor returns, every interrupt is called and
/// [`run`](Self::run) waits for all actors to exit before returning the first actor's
/// result.
///
/// # Examples
///
/// ```rust
/// use reconfy::orchestrator::RunGroup;
/// use tokio::sync::oneshot;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> reconfy::error::Result<()> {
/// let mut group = RunGroup::new();
///
/// let (stop, stopped) = oneshot::channel::<()>();
/// group.add("waiter", async move {
///     let _ = stopped.await;
///     Ok(())
/// }, move || {
///     let _ = stop.send(());
/// });
/// group.add("finisher", async { Ok(()) }, || {});
///
/// group.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RunGroup {
    actors: Vec<Actor>,
}

impl RunGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an actor.
    pub fn add<E, I>(&mut self, name: impl Into<String>, execute: E, interrupt: I)
    where
        E: Future<Output = Result<()>> + Send + 'static,
        I: FnOnce() + Send + 'static,
    {
        self.actors.push(Actor {
            name: name.into(),
            execute: Box::pin(execute),
            interrupt: Box::new(interrupt),
        });
    }

    /// Number of actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether the group has no actors.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Run every actor concurrently until the first one returns, then interrupt and
    /// drain the rest.
    ///
    /// # Errors
    ///
    /// Returns the first actor's error, or [`ReloadError::Task`] if it panicked.
    pub async fn run(self) -> Result<()> {
        if self.actors.is_empty() {
            return Ok(());
        }

        let mut names = Vec::with_capacity(self.actors.len());
        let mut interrupts = Vec::with_capacity(self.actors.len());
        let mut set = JoinSet::new();

        for (index, actor) in self.actors.into_iter().enumerate() {
            names.push(actor.name);
            interrupts.push(actor.interrupt);
            let execute = actor.execute;
            set.spawn(async move { (index, execute.await) });
        }

        let first = match set.join_next().await {
            Some(Ok((index, result))) => {
                match &result {
                    Ok(()) => info!(actor = %names[index], "actor exited, interrupting the rest"),
                    Err(e) => warn!(
                        actor = %names[index],
                        error = %e,
                        "actor failed, interrupting the rest"
                    ),
                }
                result
            }
            Some(Err(e)) => {
                warn!(error = %e, "actor panicked, interrupting the rest");
                Err(ReloadError::Task(e.to_string()))
            }
            None => Ok(()),
        };

        for interrupt in interrupts {
            interrupt();
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(()))) => debug!(actor = %names[index], "actor stopped"),
                Ok((index, Err(e))) => {
                    warn!(actor = %names[index], error = %e, "actor stopped with error")
                }
                Err(e) => warn!(error = %e, "actor panicked during shutdown"),
            }
        }

        first
    }
}
