//! Background process management: detached start, PID-file stop, and the
//! JSON status surface.

use std::fs;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use fs2::FileExt;
use tracing::info;

use thor_config::AppConfig;
use thor_learner::{Learner, TopicScheduler, WikipediaTrending};
use thor_retrieve::Retriever;
use thor_store::KnowledgeStore;

#[derive(Debug, Clone)]
pub(crate) struct DaemonPaths {
    runtime_dir: PathBuf,
    pid_file: PathBuf,
    lock_file: PathBuf,
    log_file: PathBuf,
    status_file: PathBuf,
}

pub(crate) fn daemon_paths(config: &AppConfig) -> DaemonPaths {
    let runtime_dir = PathBuf::from(&config.daemon.runtime_dir);
    DaemonPaths {
        pid_file: runtime_dir.join("learner.pid"),
        lock_file: runtime_dir.join("learner.lock"),
        log_file: runtime_dir.join("learner.log"),
        status_file: runtime_dir.join("status.json"),
        runtime_dir,
    }
}

/// The learner process itself: build the stack, run until a termination
/// signal arrives, then drain and exit cleanly.
pub(crate) async fn run_learner_process(config: AppConfig) -> Result<()> {
    let paths = daemon_paths(&config);
    fs::create_dir_all(&paths.runtime_dir)?;

    let lock_file = File::create(&paths.lock_file)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| anyhow::anyhow!("another learner instance already holds the lock"))?;
    fs::write(&paths.pid_file, std::process::id().to_string())?;

    let store = Arc::new(KnowledgeStore::open(&config.learner.db_path)?);

    let mut scheduler = TopicScheduler::new(Arc::clone(&store), config.scheduler.clone());
    if config.scheduler.trending_enabled {
        let client = reqwest::Client::builder()
            .user_agent(&config.retrieval.user_agent)
            .timeout(Duration::from_secs(config.retrieval.adapter_timeout_secs))
            .build()?;
        scheduler = scheduler.with_trending(Arc::new(WikipediaTrending::new(client)));
    }
    scheduler.seed_dictionary(Path::new(&config.learner.dictionary_path))?;

    let retriever = Retriever::new(config.retrieval.clone())?;
    let learner = Learner::new(
        Arc::clone(&store),
        Arc::new(scheduler),
        Arc::new(retriever),
        config.learner.clone(),
    )
    .with_status_file(&paths.status_file);

    learner.start().await?;
    info!("learner running; send SIGINT or SIGTERM to stop");

    wait_for_termination().await?;

    learner.stop().await?;

    let _ = fs::remove_file(&paths.pid_file);
    let _ = fs::remove_file(&paths.lock_file);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Spawn a detached learner child and wait until it is alive.
pub(crate) fn daemon_start(config: &AppConfig, config_path: &str) -> Result<()> {
    let paths = daemon_paths(config);
    fs::create_dir_all(&paths.runtime_dir)?;

    if let Some(pid) = read_pid(&paths.pid_file)? {
        if is_pid_running(pid) {
            bail!("learner already running with pid {pid}; use `thor stop` first");
        }
        let _ = fs::remove_file(&paths.pid_file);
    }

    let exe = std::env::current_exe()?;
    let out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)?;
    let err = out.try_clone()?;

    let mut child = Command::new(exe)
        .args([
            "start",
            "--config",
            config_path,
            "--interval",
            &config.learner.search_interval_secs.to_string(),
            "--workers",
            &config.learner.workers.to_string(),
            "--db",
            &config.learner.db_path,
            "--dictionary",
            &config.learner.dictionary_path,
        ])
        .env("THOR_LEARNER_PROCESS", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err))
        .spawn()?;

    // The child writes the pid file once its lock is held; poll for that,
    // failing fast if it dies on bad configuration.
    for _ in 0..40 {
        if let Some(status) = child.try_wait()? {
            bail!(
                "learner exited during startup with status {status}; check {}",
                paths.log_file.display()
            );
        }
        if paths.pid_file.exists() {
            println!("learner started");
            println!("- pid: {}", child.id());
            println!("- db: {}", config.learner.db_path);
            println!("- log: {}", paths.log_file.display());
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    bail!(
        "learner did not become ready; check {}",
        paths.log_file.display()
    )
}

pub(crate) fn daemon_stop(config: &AppConfig) -> Result<()> {
    let paths = daemon_paths(config);

    let Some(pid) = read_pid(&paths.pid_file)? else {
        println!("learner is not running");
        return Ok(());
    };

    if !is_pid_running(pid) {
        let _ = fs::remove_file(&paths.pid_file);
        println!("learner was not running (stale pid file cleaned)");
        return Ok(());
    }

    terminate_pid(pid)?;
    wait_for_pid_exit(pid, Duration::from_secs(35));
    let _ = fs::remove_file(&paths.pid_file);
    let _ = fs::remove_file(&paths.lock_file);
    println!("learner stopped (pid {pid})");
    Ok(())
}

pub(crate) fn daemon_status(config: &AppConfig) -> Result<()> {
    let paths = daemon_paths(config);

    let pid = read_pid(&paths.pid_file)?;
    let running = pid.map(is_pid_running).unwrap_or(false);

    let mut doc = serde_json::json!({
        "running": running,
        "pid": pid,
        "db": config.learner.db_path,
    });
    if let Ok(raw) = fs::read_to_string(&paths.status_file) {
        if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&raw) {
            doc["stats"] = stats;
        }
    }

    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn read_pid(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    Ok(raw.trim().parse::<u32>().ok())
}

fn is_pid_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

fn terminate_pid(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let status = Command::new("kill").arg(pid.to_string()).status()?;
        if !status.success() {
            bail!("failed to terminate learner pid {pid}");
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        bail!("stop is only implemented on unix in this build")
    }
}

fn wait_for_pid_exit(pid: u32, timeout: Duration) {
    let step = Duration::from_millis(50);
    let mut waited = Duration::from_millis(0);
    while waited < timeout {
        if !is_pid_running(pid) {
            return;
        }
        std::thread::sleep(step);
        waited += step;
    }
}
