use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, eyre, WrapErr};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::{info, Level};
use trace_to_geo::geo::{self, IpInfoClient, Offline, API_URL};
use trace_to_geo::validation::Token;
use trace_to_geo::{hop, render};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Original input with city and country appended per hop
    Annotate,
    /// Every geolocation field for each hop
    Report,
    /// Full report as JSON
    Json,
}

/// Geolocate the IPs in a list or traceroute using ipinfo.io
#[derive(Debug, Parser)]
#[clap(name = "trace-to-geo", about)]
struct Opt {
    /// ipinfo.io API token
    #[clap(short = 't', long = "token", env = "IPINFO_TOKEN", value_name = "STRING")]
    token: Option<String>,

    /// Read input from a file instead of stdin
    #[clap(short = 'i', long = "input", value_name = "PATH")]
    input: Option<PathBuf>,

    #[clap(short = 'm', long = "mode", value_enum, default_value = "annotate")]
    mode: Mode,

    #[clap(long = "api-url", default_value = API_URL, value_name = "URL")]
    api_url: String,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn read_lines(input: Option<&PathBuf>) -> color_eyre::Result<Vec<String>> {
    let bytes = match input {
        Some(path) => {
            std::fs::read(path).wrap_err_with(|| format!("cannot read {}", path.display()))?
        }
        None => {
            let mut bytes = Vec::new();
            io::stdin().read_to_end(&mut bytes)?;
            bytes
        }
    };
    Ok(hop::split_lines(&bytes))
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    init_logging(opt.verbose);

    let lines = read_lines(opt.input.as_ref())?;
    if lines.iter().all(|line| line.trim().is_empty()) {
        bail!("No input detected, please try again");
    }

    let records = hop::parse(&lines);
    info!(lines = lines.len(), hops = records.len(), "parsed input");

    let geo = if hop::query_addresses(&records).is_empty() {
        geo::resolve(&records, &Offline)
    } else {
        let token = opt
            .token
            .ok_or_else(|| eyre!("an ipinfo.io token is required for public addresses"))?;
        let token = Token::new(token)?;
        info!(%token, url = %opt.api_url, "querying ipinfo.io");
        let client = IpInfoClient::with_base_url(token, opt.api_url)?;
        geo::resolve(&records, &client)
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match opt.mode {
        Mode::Annotate => {
            for line in render::annotate(&lines, &records, &geo) {
                writeln!(out, "{line}")?;
            }
        }
        Mode::Report => render::write_report(&records, &geo, &mut out)?,
        Mode::Json => {
            render::write_json(&records, &geo, &mut out)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
