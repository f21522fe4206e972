use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use anyhow::Result;

pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval_ms: u64) -> Result<Self> {
        if interval_ms == 0 {
            return Err(anyhow::anyhow!("probe interval must be greater than zero"));
        }
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
        })
    }

    /// Runs `job` every interval until ctrl-c.
    pub async fn run<J, F>(&self, job: J) -> Result<()>
    where
        J: FnMut() -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.run_until(job, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("listening for ctrl-c failed: {:?}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// job: async closure for each tick, spawned so a slow tick never delays
    /// the next one
    pub async fn run_until<J, F, S>(&self, mut job: J, shutdown: S) -> Result<()>
    where
        J: FnMut() -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut next = Instant::now();
        loop {
            next += self.interval;
            tokio::spawn(job());
            tokio::select! {
                _ = sleep_until(next) => {}
                _ = &mut shutdown => {
                    tracing::info!("scheduler stopping");
                    return Ok(());
                }
            }
        }
    }
}
