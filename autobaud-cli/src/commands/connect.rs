//! Connect command: enumerate, filter, report, then run the handshake search.

use {
    crate::{
        Cli, CliError,
        config::{Config, ProbeOverrides},
        use_fancy_output,
    },
    anyhow::{Context, Result},
    autobaud::{
        ConnectionOutcome, DeviceRecord, Error as ProbeError, NativeRegistry, NativeTransport,
        Prober, describe_devices, enumerate, filter_by_vendor,
    },
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    log::{debug, info, warn},
    std::time::Duration,
};

/// Options for the connect command.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectOptions {
    /// Explicit ports to probe instead of the filtered enumeration.
    pub ports: Vec<String>,
    /// Probe setting overrides from the command line.
    pub overrides: ProbeOverrides,
    /// Search devices concurrently.
    pub parallel: bool,
    /// Emit JSON to stdout.
    pub json: bool,
}

/// Whether two port names refer to the same device.
///
/// Windows COM names are case-insensitive; Unix device paths are not.
fn same_port(a: &str, b: &str) -> bool {
    if cfg!(windows) {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// Pick the devices to probe.
///
/// Explicit ports bypass the vendor filter; a port missing from the
/// enumeration is still probed under its given name. A port named twice is
/// probed once, at its first position.
pub(crate) fn select_devices(
    enumerated: Vec<DeviceRecord>,
    explicit: &[String],
    allowed: &[String],
) -> Vec<DeviceRecord> {
    if explicit.is_empty() {
        return filter_by_vendor(enumerated, allowed);
    }

    let mut selected: Vec<DeviceRecord> = Vec::with_capacity(explicit.len());
    for name in explicit {
        let device = enumerated
            .iter()
            .find(|d| same_port(&d.path, name))
            .cloned()
            .unwrap_or_else(|| {
                debug!("{name} not enumerated, probing anyway");
                DeviceRecord::new(name.as_str())
            });

        if selected.iter().any(|d| same_port(&d.path, &device.path)) {
            debug!("{name} given more than once");
            continue;
        }
        selected.push(device);
    }
    selected
}

/// Connect command implementation.
pub(crate) fn cmd_connect(cli: &Cli, config: &Config, options: &ConnectOptions) -> Result<()> {
    let allowed = config.allowed_manufacturers(&cli.manufacturers);
    let probe_config = config
        .probe_config(&options.overrides)
        .map_err(|e| CliError::Usage(format!("{e:#}")))?;
    let parallel = config.parallel(options.parallel);

    let enumerated = match enumerate(&NativeRegistry) {
        Ok(devices) => devices,
        Err(e) if !options.ports.is_empty() => {
            warn!("Port enumeration failed ({e}), probing the given ports as-is");
            Vec::new()
        },
        Err(e) => return Err(e).context("Failed to enumerate serial ports"),
    };
    let devices = select_devices(enumerated, &options.ports, &allowed);

    info!("{}", describe_devices(&devices));

    let prober = Prober::new(NativeTransport, probe_config);
    let total = devices.len() * prober.config().candidates.len();

    let pb = if cli.quiet || options.json || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let result = if parallel {
        pb.set_message(format!("Probing {} device(s) in parallel", devices.len()));
        prober.probe_parallel(&devices)
    } else {
        prober.probe_with_progress(&devices, &mut |candidate| {
            pb.set_message(format!(
                "Trying {} at {} baud ({}/{})",
                candidate.path,
                candidate.baud_rate,
                candidate.index + 1,
                candidate.total
            ));
        })
    };
    pb.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(ProbeError::Interrupted) => {
            return Err(CliError::Cancelled("Search interrupted".to_string()).into());
        },
        Err(e) => return Err(e).context("Probe failed"),
    };

    debug!("Search space was {total} candidate(s)");

    if options.json {
        let output = serde_json::json!({
            "ok": outcome.is_connected(),
            "data": {
                "outcome": outcome,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !cli.quiet {
        match &outcome {
            ConnectionOutcome::Connected { .. } => {
                eprintln!("{} {}", style("✓").green().bold(), outcome);
            },
            ConnectionOutcome::NotFound => {
                eprintln!("{} {}", style("✗").red().bold(), outcome);
            },
        }
    }

    match outcome {
        ConnectionOutcome::Connected { .. } => Ok(()),
        ConnectionOutcome::NotFound => Err(CliError::NotFound.into()),
    }
}
