mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use common::{create_rng_from_seed, derive_seed, get_env_usize, ConfigLoader, FsExt};
use dotenv::dotenv;
use env_logger::Env;
use log::{info, warn};
use model::{HttpPolicyService, PolicyRef, ServiceOptions};
use oracle::{EnginePool, OracleOptions};
use self_learn::{shape, SelfLearn, SelfLearnOptions};
use self_play::{OpeningBook, RolloutOptions, RolloutPlayer};

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();

    builder.enable_all();

    if let Some(worker_threads) = get_env_usize("TOKIO_THREADS")? {
        builder.worker_threads(worker_threads);
    }

    info!("{:?}", builder);

    builder.build()?.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Train(train_args) => train(&train_args.config).await,
        Commands::Rollout(rollout_args) => rollout(&rollout_args.config).await,
    }
}

struct Options {
    self_learn: SelfLearnOptions,
    rollout: RolloutOptions,
    oracle: OracleOptions,
    service: ServiceOptions,
}

fn load_options(config: &str) -> Result<Options> {
    let config_path = config.relative_to_cwd()?;
    let config = ConfigLoader::new(config_path, "self_learn".to_string())?;

    let options = Options {
        self_learn: config.load()?,
        rollout: config.load()?,
        oracle: config.load()?,
        service: config.load()?,
    };

    options
        .self_learn
        .validate(&options.rollout, &options.oracle)?;

    Ok(options)
}

fn load_opening_book(options: &SelfLearnOptions) -> Result<OpeningBook> {
    match &options.opening_book {
        Some(path) => OpeningBook::load(path),
        None => Ok(OpeningBook::default()),
    }
}

async fn train(config: &str) -> Result<()> {
    let options = load_options(config)?;
    let opening_book = load_opening_book(&options.self_learn)?;

    let service = HttpPolicyService::new(&options.service)?;
    let pool = EnginePool::new(options.oracle.clone());

    let learner = SelfLearn::new(
        &service,
        &pool,
        &options.self_learn,
        &options.rollout,
        options.oracle.budget(),
        opening_book,
        options.service.base_model.clone(),
    )?;

    let res = tokio::select! {
        res = learner.learn() => res.map(|last| match last {
            Some(record) => info!("Run complete at iteration {} with policy {}", record.iteration, record.policy),
            None => info!("Run complete"),
        }),
        _ = tokio::signal::ctrl_c() => {
            let last = learner.last_completed_iteration().unwrap_or_default();
            warn!("Interrupted. Last completed iteration: {}", last);
            Ok(())
        }
    };

    pool.shutdown().await;

    res
}

async fn rollout(config: &str) -> Result<()> {
    let options = load_options(config)?;
    let opening_book = load_opening_book(&options.self_learn)?;

    let service = HttpPolicyService::new(&options.service)?;
    let pool = EnginePool::new(options.oracle.clone());
    let player = RolloutPlayer::new(&service, &pool, &options.rollout, options.oracle.budget());

    let seed = options.self_learn.seed;
    let opening = opening_book.choose(&mut create_rng_from_seed(seed, &[0, 0]))?;
    let policy = PolicyRef::base(
        options.self_learn.run_name.clone(),
        options.service.base_model.clone(),
    );

    let trajectory = tokio::select! {
        trajectory = player.play_rollout(0, &policy, opening, derive_seed(seed, &[0, 0])) => Some(trajectory),
        _ = tokio::signal::ctrl_c() => None,
    };

    pool.shutdown().await;

    let Some(trajectory) = trajectory else {
        warn!("Interrupted");
        return Ok(());
    };

    let output = if trajectory.is_aborted() {
        serde_json::to_string_pretty(&trajectory)?
    } else {
        serde_json::to_string_pretty(&shape(trajectory, &options.self_learn.reward_options())?)?
    };

    println!("{}", output);

    Ok(())
}
