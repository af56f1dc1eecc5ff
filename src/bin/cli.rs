use anyhow::{anyhow, bail, Context};
use ffcapture::command::H264Params;
use ffcapture::rtp::{PacketSink, UdpSink};
use ffcapture::{AudioReader, CrateInfo, Device, DeviceCache, FfcaptureConfig, RtpReader, VideoReader};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const USAGE: &str = "Usage: ffcapture-cli <command> [args]

Commands:
  list-devices [--json]
  video <device> [WxH@fps] [--frames <n>] [--json]
  audio <device> [--rate <hz>] [--channels <n>] [--chunks <n>] [--json]
  rtp <device> <host:port> [WxH@fps] [--packets <n>]
  config [--write <path>]
  version [--json]

Global options:
  --config <path>   TOML configuration (default: ffcapture.toml)";

fn main() -> anyhow::Result<()> {
    ffcapture::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    if matches!(command.as_str(), "version" | "--version" | "-V") {
        println!("{}", version_text(&ffcapture::get_info(), has_flag(&args, "--json"))?);
        return Ok(());
    }

    let config = load_config(&args)?;
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args),
        "video" => cmd_video(&args, &config),
        "audio" => cmd_audio(&args, &config),
        "rtp" => cmd_rtp(&args, &config),
        "config" => cmd_config(&args, &config),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &[String]) -> anyhow::Result<FfcaptureConfig> {
    let config = match option_value(args, "--config") {
        Some(path) => FfcaptureConfig::load_from_file(path)?,
        None => FfcaptureConfig::load_or_default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn version_text(info: &CrateInfo, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string(info)?);
    }
    Ok(format!("{} {} ({})\n{}", info.name, info.version, info.os, info.description))
}

/// Value following `flag`, if present.
fn option_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parsed_option<T: std::str::FromStr>(args: &[String], flag: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    option_value(args, flag)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid value for {}", flag)))
        .transpose()
}

/// Positional arguments after the command, skipping flags and their values.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 2;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "--json" {
            i += 1;
        } else if arg.starts_with("--") {
            i += 2;
        } else {
            out.push(arg);
            i += 1;
        }
    }
    out
}

/// `WxH@fps`, e.g. `1280x720@30`.
fn parse_format(s: &str) -> anyhow::Result<(u32, u32, f64)> {
    let (size, fps) = s
        .split_once('@')
        .ok_or_else(|| anyhow!("format should be WIDTHxHEIGHT@FPS"))?;
    let (width, height) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("size should be WIDTHxHEIGHT"))?;
    Ok((width.parse()?, height.parse()?, fps.parse()?))
}

fn video_format(args: &[String], position: usize, config: &FfcaptureConfig) -> anyhow::Result<(u32, u32, f64)> {
    match positionals(args).get(position) {
        Some(format) => parse_format(format),
        None => Ok((config.video.width, config.video.height, config.video.frame_rate)),
    }
}

fn stop_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;
    Ok(running)
}

fn cmd_list_devices(args: &[String]) -> anyhow::Result<()> {
    let mut cache = DeviceCache::new();
    let devices = cache.refresh();
    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string(devices)?);
    } else if devices.is_empty() {
        println!("No capture devices found");
    } else {
        for d in devices {
            println!("{}", d);
        }
    }
    Ok(())
}

fn cmd_video(args: &[String], config: &FfcaptureConfig) -> anyhow::Result<()> {
    let device_id = *positionals(args)
        .first()
        .ok_or_else(|| anyhow!("device required, e.g. /dev/video0"))?;
    let (width, height, fps) = video_format(args, 1, config)?;
    let max_frames: Option<u64> = parsed_option(args, "--frames")?;
    let json = has_flag(args, "--json");

    let running = stop_flag()?;
    let mut reader = VideoReader::open_with_startup(
        &config.ffmpeg,
        &Device::video(device_id),
        width,
        height,
        fps,
        config.startup.policy(),
    )?;

    while running.load(Ordering::SeqCst) && max_frames.map_or(true, |n| reader.frames_read() < n) {
        let Some(frame) = reader.read_frame()? else {
            break;
        };
        let luma_mean = frame.y().iter().map(|&b| b as u64).sum::<u64>() / frame.y().len().max(1) as u64;
        if json {
            let line = serde_json::json!({
                "sequence": reader.frames_read(),
                "width": frame.width(),
                "height": frame.height(),
                "luma_mean": luma_mean,
            });
            println!("{}", line);
        } else {
            println!(
                "Frame {}: {}x{} luma_mean={}",
                reader.frames_read(),
                frame.width(),
                frame.height(),
                luma_mean
            );
        }
    }

    let status = reader.close()?;
    log::info!("ffmpeg exited with {}", status);
    Ok(())
}

fn cmd_audio(args: &[String], config: &FfcaptureConfig) -> anyhow::Result<()> {
    let device_id = *positionals(args)
        .first()
        .ok_or_else(|| anyhow!("device required, e.g. hw:0"))?;
    let rate = parsed_option(args, "--rate")?.unwrap_or(config.audio.sample_rate);
    let channels = parsed_option(args, "--channels")?.unwrap_or(config.audio.channels);
    let max_chunks: Option<u64> = parsed_option(args, "--chunks")?;
    let json = has_flag(args, "--json");

    let running = stop_flag()?;
    let mut reader = AudioReader::open(
        &config.ffmpeg,
        &Device::audio(device_id),
        rate,
        channels,
        config.audio_latency(),
    )?;

    let mut chunks = 0u64;
    while running.load(Ordering::SeqCst) && max_chunks.map_or(true, |n| chunks < n) {
        let Some(chunk) = reader.read_chunk()? else {
            break;
        };
        chunks += 1;
        let peak = chunk.data.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        if json {
            let line = serde_json::json!({
                "sequence": chunks,
                "samples_per_channel": chunk.samples_per_channel,
                "channels": chunk.channels,
                "duration_ms": chunk.duration().as_secs_f64() * 1000.0,
                "peak": peak,
            });
            println!("{}", line);
        } else {
            println!(
                "Chunk {}: {} samples/ch x {} ch, peak={}",
                chunks, chunk.samples_per_channel, chunk.channels, peak
            );
        }
    }

    let status = reader.close()?;
    log::info!("ffmpeg exited with {}", status);
    Ok(())
}

fn cmd_rtp(args: &[String], config: &FfcaptureConfig) -> anyhow::Result<()> {
    let positional = positionals(args);
    let (device_id, target) = match positional.as_slice() {
        [device, target, ..] => (*device, *target),
        _ => bail!("usage: rtp <device> <host:port> [WxH@fps]"),
    };
    let (width, height, fps) = video_format(args, 2, config)?;
    let max_packets: Option<u64> = parsed_option(args, "--packets")?;

    let mut params = H264Params::new(device_id, width, height, fps);
    params.bit_rate_kbps = config.video.bit_rate_kbps;
    params.profile = config.video.profile.clone();
    params.preset = config.video.preset.clone();

    let mut packetizer = config.packetizer_config();
    packetizer.frame_rate = fps;

    let running = stop_flag()?;
    let mut sink = UdpSink::connect(target, config.rtp.mtu)?;
    let mut reader = RtpReader::open(&config.ffmpeg, &Device::video(device_id), &params, packetizer)?;
    let mut announced = false;

    while running.load(Ordering::SeqCst) && max_packets.map_or(true, |n| sink.packets_sent() < n) {
        let Some(packets) = reader.read_packets()? else {
            break;
        };
        sink.send_all(&packets)?;

        if !announced {
            if let Some(profile) = reader.packetizer().profile_level_id() {
                if reader.packetizer().pps().is_some() {
                    println!(
                        "m=video {} RTP/AVP {}\na=rtpmap:{} H264/90000\na=fmtp:{} packetization-mode=1;profile-level-id={}",
                        sink.peer().port(),
                        config.rtp.payload_type,
                        config.rtp.payload_type,
                        config.rtp.payload_type,
                        profile
                    );
                    announced = true;
                }
            }
        }
    }

    log::info!("Sent {} RTP packets to {}", sink.packets_sent(), sink.peer());
    let status = reader.close()?;
    log::info!("ffmpeg exited with {}", status);
    Ok(())
}

fn cmd_config(args: &[String], config: &FfcaptureConfig) -> anyhow::Result<()> {
    match option_value(args, "--write") {
        Some(path) => {
            config.save_to_file(PathBuf::from(path))?;
            println!("Wrote {}", path);
        }
        None => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}
