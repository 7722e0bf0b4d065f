//! Application objects behind each subcommand

use anyhow::{Context, Result};
use async_trait::async_trait;
use rfm_host::{CancellationMode, OperationHost};
use rfm_probe::OperationProbe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::animate::{Interpreter, LaunchOptions, Launcher, OutputFormat};
use crate::config::{self, Settings};

/// Two-phase application contract
///
/// `initialize` does everything that can fail before work starts; `run`
/// returns the process exit code.
#[async_trait]
pub trait Application: Send {
    fn name(&self) -> &'static str;

    async fn initialize(&mut self) -> Result<()>;

    async fn run(&mut self) -> Result<i32>;
}

/// Drive an application: `1` if initialization fails, else its exit code
pub async fn run_app(app: &mut dyn Application) -> i32 {
    if let Err(e) = app.initialize().await {
        error!("Failed to initialize {}: {:#}", app.name(), e);
        return 1;
    }

    match app.run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{} failed: {:#}", app.name(), e);
            1
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let mapping = config::load(path.map(PathBuf::as_path))?;
    Settings::from_mapping(&mapping)
}

/// CLI overrides for the host
#[derive(Debug, Clone, Default)]
pub struct HostOverrides {
    pub bind: Option<String>,
    pub cooperative: bool,
    pub announce: bool,
}

pub struct HostApp {
    config_path: Option<PathBuf>,
    overrides: HostOverrides,
    settings: Option<Settings>,
}

impl HostApp {
    pub fn new(config_path: Option<PathBuf>, overrides: HostOverrides) -> Self {
        Self {
            config_path,
            overrides,
            settings: None,
        }
    }
}

#[async_trait]
impl Application for HostApp {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn initialize(&mut self) -> Result<()> {
        let mut settings = load_settings(self.config_path.as_ref())?;
        if let Some(bind) = &self.overrides.bind {
            settings.host.bind = bind.clone();
        }
        if self.overrides.cooperative {
            settings.host.cancellation = CancellationMode::Cooperative;
        }
        if self.overrides.announce {
            settings.host.announce_connections = true;
        }
        self.settings = Some(settings);
        Ok(())
    }

    async fn run(&mut self) -> Result<i32> {
        let settings = self.settings.as_ref().context("host not initialized")?;
        let bind = settings.host.bind.clone();
        let host = Arc::new(OperationHost::new(settings.host.host_config()));

        info!("Starting operation host on ws://{}", bind);
        info!("Cancellation mode: {:?}", host.config().cancellation);

        let serving = Arc::clone(&host);
        let server = tokio::spawn(async move { serving.serve_websocket(&bind).await });

        let stopper = Arc::clone(&host);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                stopper.stop();
            }
        });

        server
            .await
            .context("host task panicked")?
            .context("host stopped with an error")?;
        Ok(0)
    }
}

pub struct ProbeApp {
    config_path: Option<PathBuf>,
    url: Option<String>,
    probe: Option<OperationProbe>,
}

impl ProbeApp {
    pub fn new(config_path: Option<PathBuf>, url: Option<String>) -> Self {
        Self {
            config_path,
            url,
            probe: None,
        }
    }
}

#[async_trait]
impl Application for ProbeApp {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn initialize(&mut self) -> Result<()> {
        let settings = load_settings(self.config_path.as_ref())?;
        let mut probe_config = settings.probe.probe_config();
        if let Some(url) = &self.url {
            probe_config.url = url.clone();
        }
        self.probe = Some(OperationProbe::new(probe_config));
        Ok(())
    }

    async fn run(&mut self) -> Result<i32> {
        let probe = self.probe.as_mut().context("probe not initialized")?;
        let passed = probe.run().await?;
        if passed {
            info!("Probe passed");
            Ok(0)
        } else {
            error!("Probe failed");
            Ok(1)
        }
    }
}

/// CLI overrides for the launcher
#[derive(Debug, Clone, Default)]
pub struct AnimateOverrides {
    pub script: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub open: Option<bool>,
}

pub struct AnimateApp {
    config_path: Option<PathBuf>,
    overrides: AnimateOverrides,
    launcher: Option<Arc<Launcher>>,
}

impl AnimateApp {
    pub fn new(config_path: Option<PathBuf>, overrides: AnimateOverrides) -> Self {
        Self {
            config_path,
            overrides,
            launcher: None,
        }
    }
}

#[async_trait]
impl Application for AnimateApp {
    fn name(&self) -> &'static str {
        "animate"
    }

    async fn initialize(&mut self) -> Result<()> {
        let mut settings = load_settings(self.config_path.as_ref())?.animation;
        if let Some(script) = &self.overrides.script {
            settings.script = script.clone();
        }

        let interpreter = Interpreter::resolve(&settings.interpreters).with_context(|| {
            format!(
                "No script interpreter found (tried {})",
                settings.interpreters.join(", ")
            )
        })?;

        self.launcher = Some(Arc::new(Launcher::new(interpreter, settings)));
        Ok(())
    }

    async fn run(&mut self) -> Result<i32> {
        let launcher = Arc::clone(self.launcher.as_ref().context("launcher not initialized")?);
        debug!(
            "Rendering with {} ({})",
            launcher.interpreter().program,
            launcher.interpreter().version
        );
        let options = LaunchOptions {
            format: self.overrides.format,
            open: self.overrides.open,
        };

        // Prompts and the render subprocess block
        let outcome = tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            launcher.run(options, &mut stdin.lock(), &mut stdout)
        })
        .await
        .context("launcher task panicked")??;

        if outcome.opened {
            info!("Done");
        } else {
            info!("Done, animation is at {}", outcome.output.display());
        }
        Ok(0)
    }
}
