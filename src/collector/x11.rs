use crate::collector::sampler::{Sample, Sampler, SamplerError};
use crate::collector::tracker::UNKNOWN_LABEL;
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::debug;

/// Probes the focused X11 window with `xprintidle`, `xdotool` and `wmctrl`.
///
/// Missing tools degrade to an `unknown` label or zero idle time. Only a
/// probe that hangs past its timeout fails the whole sample.
pub struct X11Sampler {
    idle_threshold_seconds: u64,
    probe_timeout: Duration,
}

impl X11Sampler {
    pub fn new(idle_threshold_seconds: u64, probe_timeout: Duration) -> Self {
        Self {
            idle_threshold_seconds,
            probe_timeout,
        }
    }

    async fn idle_seconds(&self) -> Result<u64, SamplerError> {
        let output = run_probe("xprintidle", &[], self.probe_timeout).await?;

        Ok(output
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(|millis| millis / 1000)
            .unwrap_or(0))
    }

    async fn window_title(&self) -> Result<Option<String>, SamplerError> {
        let title = run_probe(
            "xdotool",
            &["getactivewindow", "getwindowname"],
            self.probe_timeout,
        )
        .await?;

        if title.is_some() {
            return Ok(title);
        }

        let listing = run_probe("wmctrl", &["-l"], self.probe_timeout).await?;
        Ok(listing.and_then(|raw| raw.lines().last().and_then(wmctrl_title)))
    }

    async fn window_pid(&self) -> Result<Option<u32>, SamplerError> {
        let pid = run_probe(
            "xdotool",
            &["getactivewindow", "getwindowpid"],
            self.probe_timeout,
        )
        .await?;

        Ok(pid.and_then(|raw| raw.parse::<u32>().ok()))
    }
}

impl Sampler for X11Sampler {
    async fn sample(&mut self) -> Result<Sample, SamplerError> {
        let idle_seconds = self.idle_seconds().await?;
        if idle_seconds >= self.idle_threshold_seconds {
            return Ok(Sample::idle(idle_seconds));
        }

        let label = self
            .window_title()
            .await?
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        let detail = self
            .window_pid()
            .await?
            .map(|pid| format!("pid:{pid}"))
            .unwrap_or_else(|| "no_pid".to_string());

        Ok(Sample::Active { label, detail })
    }
}

/// `Ok(None)` when the tool is missing, exits non-zero or prints nothing.
async fn run_probe(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<Option<String>, SamplerError> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match timeout(limit, output).await {
        Err(_) => {
            return Err(SamplerError::Timeout {
                probe: program.to_string(),
            });
        }
        Ok(Err(error)) => {
            debug!(probe = program, error = %error, "probe could not be launched");
            return Ok(None);
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        debug!(probe = program, status = %output.status, "probe failed");
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!stdout.is_empty()).then_some(stdout))
}

/// Title column of a `wmctrl -l` line: everything after the third field.
fn wmctrl_title(line: &str) -> Option<String> {
    let mut rest = line.trim_start();
    for _ in 0..3 {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }

    let title = rest.trim_end();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::{X11Sampler, run_probe, wmctrl_title};
    use crate::collector::sampler::{Sample, Sampler};
    use tokio::time::Duration;

    #[test]
    fn wmctrl_title_keeps_inner_spacing() {
        let line = "0x04400003  0 host  main.rs  -  Visual Studio Code";
        assert_eq!(
            wmctrl_title(line).as_deref(),
            Some("main.rs  -  Visual Studio Code")
        );
    }

    #[test]
    fn wmctrl_title_rejects_short_lines() {
        assert_eq!(wmctrl_title("0x01 0 host"), None);
        assert_eq!(wmctrl_title(""), None);
    }

    #[tokio::test]
    async fn missing_probe_degrades_to_none() {
        let output = run_probe(
            "definitely-not-an-installed-probe",
            &[],
            Duration::from_secs(1),
        )
        .await
        .expect("launch failure is tolerated");

        assert_eq!(output, None);
    }

    #[tokio::test]
    async fn no_display_degrades_to_unknown_window() {
        // SAFETY: no other test in this binary reads DISPLAY.
        unsafe { std::env::remove_var("DISPLAY") };

        let mut sampler = X11Sampler::new(60, Duration::from_secs(2));
        let sample = sampler.sample().await.expect("missing display is not an error");

        assert_eq!(sample, Sample::active("unknown", "no_pid"));
    }
}
