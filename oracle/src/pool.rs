use std::sync::atomic::{AtomicUsize, Ordering};

use engine::BoardState;
use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::{
    terminal_evaluation, EngineError, Evaluation, Evaluator, OracleOptions, Score, SearchBudget,
    UciEngine,
};

/// A bounded set of engine processes. At most `engine_pool_size` are checked out at once; processes are
/// started lazily and replaced after a crash or timeout.
pub struct EnginePool {
    options: OracleOptions,
    idle: Mutex<Vec<UciEngine>>,
    permits: Semaphore,
    spawned: AtomicUsize,
}

impl EnginePool {
    pub fn new(options: OracleOptions) -> Self {
        let permits = Semaphore::new(options.engine_pool_size);

        Self {
            options,
            idle: Mutex::new(Vec::new()),
            permits,
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &OracleOptions {
        &self.options
    }

    pub async fn checkout(&self) -> Result<EngineGuard<'_>, EngineError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::PoolClosed)?;

        let idle = self.idle.lock().pop();
        let engine = match idle {
            Some(engine) => engine,
            None => {
                let id = self.spawned.fetch_add(1, Ordering::SeqCst);
                info!("Starting engine {}: {}", id, self.options.engine_path);
                UciEngine::spawn(id, &self.options).await?
            }
        };

        Ok(EngineGuard {
            pool: self,
            engine: Some(engine),
            _permit: permit,
        })
    }

    /// Number of engine processes started over the lifetime of the pool.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Refuses further checkouts and stops every idle engine. Engines still checked out are stopped when
    /// their guard drops.
    pub async fn shutdown(&self) {
        self.permits.close();

        let engines = std::mem::take(&mut *self.idle.lock());
        info!("Stopping {} engines", engines.len());

        for engine in engines {
            engine.quit().await;
        }
    }

    fn checkin(&self, engine: UciEngine) {
        if self.permits.is_closed() || !engine.is_idle() {
            return;
        }

        self.idle.lock().push(engine);
    }
}

/// Exclusive use of one engine. Dropping the guard returns the engine to the pool unless it was discarded
/// or dropped mid-search, in which case the process is killed.
pub struct EngineGuard<'a> {
    pool: &'a EnginePool,
    engine: Option<UciEngine>,
    _permit: SemaphorePermit<'a>,
}

impl EngineGuard<'_> {
    pub fn id(&self) -> Option<usize> {
        self.engine.as_ref().map(|e| e.id())
    }

    pub async fn search(
        &mut self,
        position_command: &str,
        budget: &SearchBudget,
    ) -> Result<Score, EngineError> {
        match self.engine.as_mut() {
            Some(engine) => engine.search(position_command, budget).await,
            None => Err(EngineError::Exited),
        }
    }

    pub fn discard(&mut self) {
        self.engine = None;
    }
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.checkin(engine);
        }
    }
}

impl Evaluator for EnginePool {
    async fn evaluate(
        &self,
        state: &BoardState,
        budget: &SearchBudget,
    ) -> Result<Evaluation, EngineError> {
        if let Some(evaluation) = terminal_evaluation(state) {
            return Ok(evaluation);
        }

        let mut engine = self.checkout().await?;
        let position_command = state.uci_position_command();

        match tokio::time::timeout(budget.timeout, engine.search(&position_command, budget)).await {
            Ok(Ok(score)) => Ok(Evaluation::from_score(score)),
            Ok(Err(err)) => {
                warn!("Engine {:?} failed: {}", engine.id(), err);
                engine.discard();
                Err(err)
            }
            Err(_) => {
                warn!(
                    "Engine {:?} exceeded {:?}, replacing it",
                    engine.id(),
                    budget.timeout
                );
                engine.discard();
                Ok(Evaluation::unknown())
            }
        }
    }
}
