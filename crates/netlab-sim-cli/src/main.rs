use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use netlab_abstract::{
    DumbbellParams, MeshParams, QueueParams, ScenarioFile, SimConfig, SimConfigOverride,
};
use netlab_simulator::scenarios::{self, Dumbbell, Mesh, QueueExperiment, ScenarioOutcome};
use netlab_simulator::{SamplePoint, SimulationReport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Network lab scenario runner")]
struct Args {
    /// Load engine settings and scenario parameters from a TOML file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Run length in seconds.
    #[arg(long, global = true)]
    stop_time: Option<f64>,

    /// Throughput sampling period in seconds.
    #[arg(long, global = true)]
    sample_period: Option<f64>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long, global = true)]
    trace_out: Option<PathBuf>,

    /// Write the sampled throughput series as gnuplot data.
    #[arg(long, global = true)]
    plot_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bulk senders sharing one bottleneck link.
    Dumbbell(DumbbellFlags),
    /// On/off sources across DropTail or RED bottlenecks.
    Queue(QueueFlags),
    /// Ad-hoc nodes sending to random peers over a shared medium.
    Mesh(MeshFlags),
}

#[derive(ClapArgs, Debug, Default)]
struct DumbbellFlags {
    #[arg(long = "maxBytes")]
    max_bytes: Option<u64>,
    #[arg(long = "windowSize")]
    window_size: Option<u32>,
    #[arg(long = "queueSize")]
    queue_size: Option<u64>,
    #[arg(long = "segSize")]
    seg_size: Option<u32>,
    #[arg(long = "nFlows")]
    n_flows: Option<u32>,
    /// 0 for Tahoe, 1 for Reno.
    #[arg(long = "tcpType")]
    tcp_type: Option<u32>,
}

#[derive(ClapArgs, Debug, Default)]
struct QueueFlags {
    #[arg(long = "maxBytes")]
    max_bytes: Option<u64>,
    #[arg(long = "windowSize")]
    window_size: Option<u32>,
    #[arg(long)]
    load: Option<f64>,
    /// `RED` or `DropTail`.
    #[arg(long)]
    queue: Option<String>,
    #[arg(long = "MinTh")]
    min_th: Option<f64>,
    #[arg(long = "MaxTh")]
    max_th: Option<f64>,
    #[arg(long = "Wq")]
    wq: Option<f64>,
    #[arg(long)]
    qlen: Option<u64>,
    #[arg(long = "maxP")]
    max_p: Option<f64>,
}

#[derive(ClapArgs, Debug, Default)]
struct MeshFlags {
    #[arg(long = "nodeDensity")]
    node_density: Option<f64>,
    /// 0 for OLSR, 1 for AODV.
    #[arg(long)]
    protocol: Option<u32>,
    /// Transmission power in mW.
    #[arg(long)]
    txp: Option<f64>,
    #[arg(long)]
    intensity: Option<f64>,
    #[arg(long = "snrDb")]
    snr_db: Option<f64>,
    #[arg(long = "packetSize")]
    packet_size: Option<u32>,
    #[arg(long = "queuePackets")]
    queue_packets: Option<usize>,
    #[arg(long = "lossRate")]
    loss_rate: Option<f64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("netlab starting…");

    let file = match &args.config {
        Some(path) => load_scenario_file(path)?,
        None => ScenarioFile::default(),
    };
    let outcome = args.run(&file)?;

    for line in &outcome.lines {
        println!("{line}");
    }
    if let Some(path) = &args.trace_out {
        write_trace(path, &outcome.report)?;
    }
    if let Some(path) = &args.plot_out {
        write_plot(path, &outcome.report.samples)?;
    }
    Ok(())
}

impl Args {
    fn sim_config(&self, file: &ScenarioFile) -> Result<SimConfig> {
        let mut config = SimConfig::default();
        file.config.apply_to(&mut config);
        SimConfigOverride {
            seed: self.seed,
            stop_time: self.stop_time,
            sample_period: self.sample_period,
        }
        .apply_to(&mut config);

        if !(config.stop_time > 0.0) {
            bail!("stop time must be positive, got {}", config.stop_time);
        }
        if !(config.sample_period > 0.0) {
            bail!("sample period must be positive, got {}", config.sample_period);
        }
        Ok(config)
    }

    fn run(&self, file: &ScenarioFile) -> Result<ScenarioOutcome> {
        let config = self.sim_config(file)?;
        if let Some(name) = &file.name {
            info!(
                "Scenario file `{}`: {}",
                name,
                file.description.as_deref().unwrap_or("")
            );
        }

        let outcome = match &self.command {
            Command::Dumbbell(flags) => {
                let mut params = file.dumbbell.clone().unwrap_or_default();
                flags.apply_to(&mut params);
                scenarios::execute(
                    Dumbbell::build(config, params).context("Invalid dumbbell parameters")?,
                )
            }
            Command::Queue(flags) => {
                let mut params = file.queue.clone().unwrap_or_default();
                flags.apply_to(&mut params);
                scenarios::execute(
                    QueueExperiment::build(config, params).context("Invalid queue parameters")?,
                )
            }
            Command::Mesh(flags) => {
                let mut params = file.mesh.clone().unwrap_or_default();
                flags.apply_to(&mut params);
                scenarios::execute(Mesh::build(config, params).context("Invalid mesh parameters")?)
            }
        };
        Ok(outcome)
    }
}

impl DumbbellFlags {
    fn apply_to(&self, params: &mut DumbbellParams) {
        if let Some(v) = self.max_bytes {
            params.max_bytes = v;
        }
        if let Some(v) = self.window_size {
            params.window_size = v;
        }
        if let Some(v) = self.queue_size {
            params.queue_size = v;
        }
        if let Some(v) = self.seg_size {
            params.seg_size = v;
        }
        if let Some(v) = self.n_flows {
            params.n_flows = v;
        }
        if let Some(v) = self.tcp_type {
            params.tcp_type = v;
        }
    }
}

impl QueueFlags {
    fn apply_to(&self, params: &mut QueueParams) {
        if let Some(v) = self.max_bytes {
            params.max_bytes = v;
        }
        if let Some(v) = self.window_size {
            params.window_size = v;
        }
        if let Some(v) = self.load {
            params.load = v;
        }
        if let Some(v) = &self.queue {
            params.queue = v.clone();
        }
        if let Some(v) = self.min_th {
            params.min_th = v;
        }
        if let Some(v) = self.max_th {
            params.max_th = v;
        }
        if let Some(v) = self.wq {
            params.wq = v;
        }
        if let Some(v) = self.qlen {
            params.qlen = v;
        }
        if let Some(v) = self.max_p {
            params.max_p = v;
        }
    }
}

impl MeshFlags {
    fn apply_to(&self, params: &mut MeshParams) {
        if let Some(v) = self.node_density {
            params.node_density = v;
        }
        if let Some(v) = self.protocol {
            params.protocol = v;
        }
        if let Some(v) = self.txp {
            params.txp = v;
        }
        if let Some(v) = self.intensity {
            params.intensity = v;
        }
        if let Some(v) = self.snr_db {
            params.snr_db = v;
        }
        if let Some(v) = self.packet_size {
            params.packet_size = v;
        }
        if let Some(v) = self.queue_packets {
            params.queue_packets = v;
        }
        if let Some(v) = self.loss_rate {
            params.loss_rate = v;
        }
    }
}

fn init_logging() {
    // Report lines own stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
}

fn load_scenario_file(path: &Path) -> Result<ScenarioFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let file: ScenarioFile = toml::from_str(&content).context("Failed to parse scenario file")?;
    Ok(file)
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

fn plot_data(samples: &[SamplePoint]) -> String {
    let mut out = String::new();
    for point in samples {
        let _ = writeln!(out, "{} {}", point.time.as_secs_f64(), point.value);
    }
    out
}

fn write_plot(path: &Path, samples: &[SamplePoint]) -> Result<()> {
    fs::write(path, plot_data(samples))
        .with_context(|| format!("Failed to write plot data {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlab_abstract::SimTime;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn accepts_original_flag_names() {
        let args = parse(&[
            "netlab", "queue", "--queue", "RED", "--MinTh", "400", "--MaxTh", "1200", "--Wq",
            "0.5", "--maxP", "0.2", "--qlen", "3000", "--load", "0.5",
        ]);
        let Command::Queue(flags) = &args.command else {
            panic!("expected the queue subcommand");
        };
        let mut params = QueueParams::default();
        flags.apply_to(&mut params);
        assert!(params.uses_red());
        assert_eq!(params.min_th, 400.0);
        assert_eq!(params.max_th, 1200.0);
        assert_eq!(params.wq, 0.5);
        assert_eq!(params.max_p, 0.2);
        assert_eq!(params.qlen, 3000);
        assert_eq!(params.load, 0.5);
    }

    #[test]
    fn rejects_unknown_flags_and_bad_numbers() {
        assert!(Args::try_parse_from(["netlab", "dumbbell", "--bogus", "1"]).is_err());
        assert!(Args::try_parse_from(["netlab", "dumbbell", "--nFlows", "two"]).is_err());
        assert!(Args::try_parse_from(["netlab", "mesh", "--MinTh", "3"]).is_err());
        assert!(Args::try_parse_from(["netlab"]).is_err());
    }

    #[test]
    fn flags_override_file_which_overrides_defaults() {
        let file: ScenarioFile = toml::from_str(
            r#"
            [config]
            seed = 7
            stop_time = 4.0

            [dumbbell]
            nFlows = 3
            segSize = 512
            "#,
        )
        .unwrap();
        let args = parse(&["netlab", "dumbbell", "--segSize", "256", "--stop-time", "2"]);

        let config = args.sim_config(&file).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.stop_time, 2.0);
        assert_eq!(config.sample_period, 0.1);

        let Command::Dumbbell(flags) = &args.command else {
            panic!("expected the dumbbell subcommand");
        };
        let mut params = file.dumbbell.clone().unwrap_or_default();
        flags.apply_to(&mut params);
        assert_eq!(params.n_flows, 3);
        assert_eq!(params.seg_size, 256);
        assert_eq!(params.window_size, 2000);
    }

    #[test]
    fn runs_a_short_mesh() {
        let args = parse(&["netlab", "--stop-time", "1.5", "mesh", "--protocol", "1"]);
        let outcome = args.run(&ScenarioFile::default()).unwrap();
        assert_eq!(outcome.lines.len(), 1);
        assert!(outcome.lines[0].to_string().starts_with("nodeDensity,0.00002,protocol,1,"));
        assert_eq!(outcome.report.samples.len(), 15);
    }

    #[test]
    fn invalid_parameters_fail_the_run() {
        let args = parse(&["netlab", "dumbbell", "--nFlows", "0"]);
        assert!(args.run(&ScenarioFile::default()).is_err());

        let args = parse(&["netlab", "queue", "--stop-time", "0"]);
        assert!(args.run(&ScenarioFile::default()).is_err());
    }

    #[test]
    fn plot_data_is_two_columns() {
        let samples = [
            SamplePoint {
                time: SimTime::ZERO,
                value: 0.0,
            },
            SamplePoint {
                time: SimTime::from_millis(100),
                value: 0.25,
            },
        ];
        assert_eq!(plot_data(&samples), "0 0\n0.1 0.25\n");
    }
}
