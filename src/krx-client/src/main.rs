// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod audio_client;
mod cat_client;
mod config;
mod dxcluster_client;
#[cfg(test)]
mod fake_sdr;
mod link;
mod recorder;
mod status_probe;
mod waterfall_client;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use krx_app::init_logging;
use krx_core::session::{CatSync, SessionClock};
use krx_core::{DynResult, RadioMode};

use audio_client::{AudioOptions, AudioStream};
use cat_client::RigControlClient;
use config::ClientConfig;
use dxcluster_client::{DxClusterOptions, SpotFeedClient};
use waterfall_client::{WaterfallOptions, WaterfallStream};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - remote SDR receiver client");
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);
const CAT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Stream health and DX window checks.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// SDR server (host[:port[:password]])
    #[arg(short = 's', long = "server")]
    server: Option<String>,
    /// SDR server password
    #[arg(long = "password")]
    password: Option<String>,
    /// Initial frequency in kHz
    #[arg(short = 'f', long = "freq")]
    freq_khz: Option<f64>,
    /// Initial waterfall zoom (0-14)
    #[arg(short = 'z', long = "zoom")]
    zoom: Option<u32>,
    /// Demodulation mode (USB, LSB, CW, AM, NFM)
    #[arg(short = 'm', long = "mode")]
    mode: Option<RadioMode>,
    /// Waterfall only, no audio stream
    #[arg(long = "no-audio")]
    no_audio: bool,
    /// Enable CAT through rigctld at host[:port]
    #[arg(long = "cat", value_name = "HOST[:PORT]")]
    cat: Option<String>,
    /// Station callsign
    #[arg(short = 'c', long = "callsign")]
    callsign: Option<String>,
    /// Enable the DX cluster spot feed
    #[arg(long = "dxcluster")]
    dxcluster: bool,
    /// Record receiver audio from startup
    #[arg(long = "record")]
    record: bool,
}

/// `host[:port]`, keeping `default_port` when no port is given.
fn parse_host_port(addr: &str, default_port: u16) -> Result<(String, u16), String> {
    let addr = addr.trim();
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in '{addr}'"))?;
            (host, port)
        }
        _ => (addr, default_port),
    };
    if host.is_empty() {
        return Err(format!("missing host in '{addr}'"));
    }
    Ok((host.to_string(), port))
}

/// CLI overrides file; file overrides defaults.
fn apply_cli(cfg: &mut ClientConfig, cli: &Cli) -> Result<(), String> {
    if let Some(server) = &cli.server {
        cfg.server.address = Some(server.clone());
    }
    if let Some(password) = &cli.password {
        cfg.server.password = Some(password.clone());
    }
    if let Some(freq_khz) = cli.freq_khz {
        cfg.audio.freq_khz = freq_khz;
        cfg.waterfall.freq_khz = Some(freq_khz);
    }
    if let Some(zoom) = cli.zoom {
        cfg.waterfall.zoom = zoom;
    }
    if let Some(mode) = cli.mode {
        cfg.audio.mode = Some(mode);
    }
    if cli.no_audio {
        cfg.audio.enabled = false;
    }
    if let Some(cat) = &cli.cat {
        let (host, port) = parse_host_port(cat, cfg.cat.port)?;
        cfg.cat.enabled = true;
        cfg.cat.host = host;
        cfg.cat.port = port;
    }
    if let Some(callsign) = &cli.callsign {
        cfg.general.callsign = Some(callsign.clone());
    }
    if cli.dxcluster {
        cfg.dxcluster.enabled = true;
    }
    Ok(())
}

fn main() -> DynResult<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let app = rt.block_on(async_init())?;
    rt.block_on(app.run())
}

async fn async_init() -> DynResult<App> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ClientConfig::example_toml());
        std::process::exit(0);
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ClientConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ClientConfig::load_from_default_paths()?
    };
    apply_cli(&mut cfg, &cli)?;
    cfg.validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;

    init_logging(cfg.general.log_level.as_deref());
    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let endpoint = cfg
        .server
        .endpoint()?
        .ok_or("SDR server not specified. Use --server or set [server].address in config.")?;

    let clock = SessionClock::new();
    let waterfall = WaterfallStream::connect(
        endpoint.clone(),
        &clock,
        WaterfallOptions {
            zoom: cfg.waterfall.zoom,
            center_khz: cfg.waterfall.freq_khz,
            averaging: cfg.waterfall.averaging,
            history_rows: cfg.waterfall.history_rows,
            auto_scale: cfg.waterfall.auto_scale,
            probe_status: cfg.server.probe_status,
            ..WaterfallOptions::default()
        },
    )
    .await?;

    let audio = if cfg.audio.enabled {
        let freq_khz = cfg.audio.freq_khz;
        let mode = cfg.audio.mode.unwrap_or(if cfg.session.auto_mode {
            RadioMode::auto_for(freq_khz)
        } else {
            RadioMode::USB
        });
        let audio = AudioStream::connect(
            endpoint.clone(),
            &clock,
            AudioOptions {
                freq_khz,
                mode,
                cw_pitch_hz: cfg.audio.cw_pitch_hz,
                input_rate: cfg.audio.input_rate,
                output_rate: cfg.audio.output_rate,
                channels: cfg.audio.channels,
                queue_len: cfg.audio.queue_len,
                chunks: cfg.audio.chunks,
                volume_pct: cfg.audio.volume,
                recording_dir: cfg.recording.dir.clone(),
                // The waterfall connect already probed.
                probe_status: false,
                ..AudioOptions::default()
            },
        )
        .await?;
        if cfg.session.wf_snd_link {
            waterfall.set_freq_zoom(freq_khz, waterfall.tuning().zoom())?;
        }
        if cli.record {
            audio.start_recording();
        }
        Some(audio)
    } else {
        None
    };

    let dx = if cfg.dxcluster.enabled {
        let callsign = cfg.dx_callsign().unwrap_or_default().to_string();
        let tuning = waterfall.tuning();
        let offset = waterfall.freq_offset_khz();
        let mut opts = DxClusterOptions::new(callsign);
        opts.host = cfg.dxcluster.host.clone();
        opts.port = cfg.dxcluster.port;
        opts.reconnect_delay = Duration::from_secs(cfg.dxcluster.reconnect_delay_secs);
        opts.window_khz = (tuning.start_khz() + offset, tuning.end_khz() + offset);
        Some(SpotFeedClient::connect(opts)?)
    } else {
        None
    };

    Ok(App {
        cfg,
        waterfall,
        audio,
        cat: None,
        cat_retry_at: Instant::now(),
        sync: CatSync::new(),
        dx,
    })
}

/// Everything the client runs after startup.
struct App {
    cfg: ClientConfig,
    waterfall: WaterfallStream,
    audio: Option<AudioStream>,
    cat: Option<RigControlClient>,
    cat_retry_at: Instant,
    sync: CatSync,
    dx: Option<SpotFeedClient>,
}

impl App {
    async fn run(mut self) -> DynResult<()> {
        let mut cat_tick = time::interval(Duration::from_millis(self.cfg.cat.poll_interval_ms));
        let mut status_tick = time::interval(STATUS_LOG_INTERVAL);
        let mut housekeeping = time::interval(HOUSEKEEPING_INTERVAL);
        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                res = &mut ctrl_c => {
                    res?;
                    info!("Ctrl+C received, shutting down");
                    break;
                }
                _ = cat_tick.tick(), if self.cfg.cat.enabled => self.poll_cat().await,
                _ = status_tick.tick() => self.report(),
                _ = housekeeping.tick() => {}
            }

            if self.waterfall.is_terminal() {
                self.shutdown().await;
                return Err("waterfall stream closed by the server".into());
            }
            if self.audio.as_ref().is_some_and(AudioStream::is_terminal) {
                warn!("Audio stream closed by the server, continuing with waterfall only");
                if let Some(mut audio) = self.audio.take() {
                    finish_recording(&audio);
                    audio.shutdown().await;
                }
            }
            self.sync_dx_window();
        }

        self.shutdown().await;
        Ok(())
    }

    /// Poll the rig and apply its frequency/mode per the session flags.
    async fn poll_cat(&mut self) {
        if !self.cat.as_ref().is_some_and(RigControlClient::is_healthy) {
            if Instant::now() < self.cat_retry_at {
                return;
            }
            self.cat_retry_at = Instant::now() + CAT_RETRY_INTERVAL;
            match RigControlClient::connect_with(
                &self.cfg.cat.host,
                self.cfg.cat.port,
                self.cfg.cat.error_policy,
            )
            .await
            {
                Ok(cat) => {
                    self.cat = Some(cat);
                    self.sync = CatSync::new();
                }
                Err(e) => {
                    warn!("CAT connect failed: {}", e);
                    self.cat = None;
                    return;
                }
            }
        }
        let Some(cat) = self.cat.as_mut() else {
            return;
        };

        let rig = cat.poll().await;
        let (freq_khz, mode) = match &self.audio {
            Some(audio) => (audio.freq_khz(), audio.mode()),
            None => (self.waterfall.tuning().center_khz(), RadioMode::USB),
        };
        let plan = self.sync.plan(&self.cfg.session, &rig, freq_khz, mode);

        if let (Some((freq_khz, mode)), Some(audio)) = (plan.audio, &self.audio) {
            match audio.set_mode_freq_passband(freq_khz, mode) {
                Ok(pb) => info!(
                    "Receiver follows rig: {:.3} kHz {} ({}..{} Hz)",
                    freq_khz, mode, pb.low_cut_hz, pb.high_cut_hz
                ),
                Err(e) => warn!("Receiver retune failed: {}", e),
            }
        }
        if let Some(center_khz) = plan.waterfall_center_khz {
            let zoom = self.waterfall.tuning().zoom();
            if let Err(e) = self.waterfall.set_freq_zoom(center_khz, zoom) {
                warn!("Waterfall retune failed: {}", e);
            }
        }
    }

    fn sync_dx_window(&self) {
        let Some(dx) = &self.dx else {
            return;
        };
        let tuning = self.waterfall.tuning();
        let offset = self.waterfall.freq_offset_khz();
        let window = (tuning.start_khz() + offset, tuning.end_khz() + offset);
        if dx.window() != window {
            dx.set_window(window.0, window.1);
        }
    }

    fn report(&self) {
        let tuning = self.waterfall.tuning();
        info!(
            "Waterfall {:.3} kHz zoom {} ({} rows)",
            tuning.center_khz(),
            tuning.zoom(),
            self.waterfall.rows_received()
        );
        if let Some(audio) = &self.audio {
            let queue = audio.queue();
            info!(
                "Receiver {:.3} kHz {}: {:.1} dBm, queue {}/{} ({} dropped)",
                audio.freq_khz(),
                audio.mode(),
                audio.rssi_dbm(),
                queue.len(),
                queue.capacity(),
                queue.dropped()
            );
        }
        if let Some(dx) = &self.dx {
            info!(
                "DX cluster {}: {} spots, {} in view",
                if dx.is_connected() { "up" } else { "down" },
                dx.spot_count(),
                dx.visible_spots().len()
            );
        }
    }

    async fn shutdown(&mut self) {
        if let Some(dx) = self.dx.as_mut() {
            dx.disconnect().await;
        }
        if let Some(audio) = self.audio.as_mut() {
            finish_recording(audio);
            audio.shutdown().await;
        }
        self.waterfall.shutdown().await;
    }
}

fn finish_recording(audio: &AudioStream) {
    match audio.stop_recording() {
        Ok(Some(path)) => info!("Recording written to {}", path.display()),
        Ok(None) => {}
        Err(e) => error!("Recording lost: {}", e),
    }
}
