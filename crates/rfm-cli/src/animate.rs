//! Animation launcher
//!
//! Runs the external rendering script with fixed render parameters and
//! optionally opens the result. The interpreter is resolved once, up front,
//! and handed to the [`Launcher`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::config::AnimationSettings;

/// Rendered file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Gif,
    Mp4,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Mp4 => "mp4",
        }
    }

    /// Menu answer: `2` picks MP4, anything else GIF
    pub fn from_choice(answer: &str) -> Self {
        match answer.trim() {
            "2" => OutputFormat::Mp4,
            _ => OutputFormat::Gif,
        }
    }
}

/// Whether an answer to the open prompt accepts; only `n` declines
pub fn accepts_open(answer: &str) -> bool {
    !answer.trim().eq_ignore_ascii_case("n")
}

/// A working script interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub version: String,
}

impl Interpreter {
    /// First candidate that answers `--version`
    pub fn resolve(candidates: &[String]) -> Option<Self> {
        candidates.iter().find_map(|program| {
            let version = probe_version(program)?;
            info!("Using {}", version);
            Some(Self {
                program: program.clone(),
                version,
            })
        })
    }
}

fn probe_version(program: &str) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| debug!("{} unavailable: {}", program, e))
        .ok()?;
    if !output.status.success() {
        debug!("{} --version exited with {}", program, output.status);
        return None;
    }

    // Older interpreters print their version on stderr
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        Some(String::from_utf8_lossy(&output.stderr).trim().to_string())
    } else {
        Some(stdout)
    }
}

/// Choices that skip the interactive prompts
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchOptions {
    pub format: Option<OutputFormat>,
    pub open: Option<bool>,
}

/// Result of a successful render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub output: PathBuf,
    pub opened: bool,
}

pub struct Launcher {
    interpreter: Interpreter,
    settings: AnimationSettings,
    work_dir: Option<PathBuf>,
}

impl Launcher {
    pub fn new(interpreter: Interpreter, settings: AnimationSettings) -> Self {
        Self {
            interpreter,
            settings,
            work_dir: None,
        }
    }

    /// Render inside `dir` instead of the current directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Arguments passed to the interpreter
    pub fn args(&self, format: OutputFormat) -> Vec<String> {
        vec![
            self.script().display().to_string(),
            "--output".to_string(),
            self.settings.output.clone(),
            "--format".to_string(),
            format.as_str().to_string(),
            "--dpi".to_string(),
            self.settings.dpi.to_string(),
            "--fps".to_string(),
            self.settings.fps.to_string(),
            "--duration".to_string(),
            self.settings.duration.to_string(),
        ]
    }

    /// Where the script writes its output
    pub fn output_path(&self, format: OutputFormat) -> Result<PathBuf> {
        let name = format!("{}.{}", self.settings.output, format.as_str());
        Ok(self.base_dir()?.join(name))
    }

    fn script(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) if self.settings.script.is_relative() => dir.join(&self.settings.script),
            _ => self.settings.script.clone(),
        }
    }

    fn base_dir(&self) -> Result<PathBuf> {
        match &self.work_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to resolve working directory"),
        }
    }

    /// Run the rendering script and return the output path
    pub fn render(&self, format: OutputFormat) -> Result<PathBuf> {
        let script = self.script();
        if !script.is_file() {
            bail!("Rendering script not found at {}", script.display());
        }

        info!("Creating animation in {} format", format.as_str().to_uppercase());
        let status = Command::new(&self.interpreter.program)
            .args(self.args(format))
            .current_dir(self.base_dir()?)
            .status()
            .with_context(|| format!("Failed to start {}", self.interpreter.program))?;
        if !status.success() {
            bail!("Rendering script failed with {}", status);
        }

        let output = self.output_path(format)?;
        info!("Animation saved to {}", output.display());
        Ok(output)
    }

    /// Open a rendered file with the configured viewer
    pub fn open(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            bail!("Animation file not found at {}", path.display());
        }

        info!("Opening animation: {}", path.display());
        let status = Command::new(&self.settings.viewer)
            .arg(path)
            .status()
            .with_context(|| format!("Failed to start viewer {}", self.settings.viewer))?;
        if !status.success() {
            bail!("Viewer {} exited with {}", self.settings.viewer, status);
        }
        Ok(())
    }

    /// Full interactive flow
    ///
    /// Prompts are skipped for choices given in `options` or, for the
    /// format, in the settings. A failure to open the result is logged and
    /// does not fail the launch.
    pub fn run<R, W>(&self, options: LaunchOptions, input: &mut R, out: &mut W) -> Result<LaunchOutcome>
    where
        R: BufRead,
        W: Write,
    {
        let format = match options.format.or(self.settings.format) {
            Some(format) => format,
            None => prompt_format(input, out)?,
        };

        let output = self.render(format)?;

        let wants_open = match options.open {
            Some(open) => open,
            None => prompt_open(input, out)?,
        };

        let opened = wants_open
            && match self.open(&output) {
                Ok(()) => true,
                Err(e) => {
                    warn!("{:#}", e);
                    warn!("Please open manually: {}", output.display());
                    false
                }
            };

        Ok(LaunchOutcome { output, opened })
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read answer")?;
    Ok(line)
}

/// Ask for the output format; an empty answer or EOF picks GIF
pub fn prompt_format<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<OutputFormat> {
    writeln!(out, "Select output format:")?;
    writeln!(out, "1. GIF (works everywhere, larger file)")?;
    writeln!(out, "2. MP4 (better quality, smaller file)")?;
    write!(out, "Enter choice (1 or 2) [default: 1]: ")?;
    out.flush()?;
    Ok(OutputFormat::from_choice(&read_answer(input)?))
}

/// Ask whether to open the result; anything but `n` accepts
pub fn prompt_open<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<bool> {
    write!(out, "Open the animation? (Y/n): ")?;
    out.flush()?;
    Ok(accepts_open(&read_answer(input)?))
}
