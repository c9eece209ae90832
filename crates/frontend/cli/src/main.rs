mod screenshot;
mod settings;
mod slots;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use emu_core::logging::{LogConfig, LogLevel};
use emu_core::types::{AudioBuffer, FrameBuffer};
use emu_core::{EngineFactory, Region, RomImage, Session, SystemInfo};
use emu_md::MdFactory;
use settings::Settings;
use slots::GameSaves;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Run a Mega Drive / Genesis cartridge headlessly")]
struct Args {
    /// Cartridge image
    rom: Option<PathBuf>,

    /// Display timing: auto, ntsc or pal
    #[arg(long)]
    region: Option<String>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Engine option as key=value (repeatable)
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Held input as PLAYER:MASK, MASK a number or button names joined by
    /// '+', e.g. 0:Right+A (repeatable)
    #[arg(long = "input", value_name = "P:MASK")]
    inputs: Vec<String>,

    /// Restore this save state file before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state file after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Restore save slot N (1-5) before running
    #[arg(long)]
    load_slot: Option<u8>,

    /// Store the final state in save slot N (1-5)
    #[arg(long)]
    save_slot: Option<u8>,

    /// Battery RAM file, read before and written after the run
    #[arg(long)]
    sram: Option<PathBuf>,

    /// Write the last frame as a PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Check that a save state replays the same frames
    #[arg(long, default_value_t = false)]
    verify_snapshot: bool,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store this run's region and options back into the --config file
    #[arg(long, default_value_t = false, requires = "config")]
    write_config: bool,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Mirror core log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the engine's system information as JSON
    #[arg(long, default_value_t = false)]
    info: bool,
}

fn parse_option(text: &str) -> Result<(&str, &str)> {
    text.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow!("option {:?} is not KEY=VALUE", text))
}

/// Settings with this run's region and option flags folded in.
fn merged_settings(settings: &Settings, args: &Args) -> Result<Settings> {
    let mut merged = settings.clone();
    if let Some(region) = &args.region {
        merged.region = Some(region.clone());
    }
    for text in &args.options {
        let (key, value) = parse_option(text)?;
        merged.options.insert(key.to_string(), value.to_string());
    }
    Ok(merged)
}

fn parse_mask(text: &str, info: &SystemInfo) -> Result<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return Ok(u32::from_str_radix(hex, 16)?);
    }
    if let Ok(value) = text.parse::<u32>() {
        return Ok(value);
    }
    text.split('+').try_fold(0u32, |mask, name| {
        let button = info
            .button(name.trim())
            .ok_or_else(|| anyhow!("unknown button {:?}", name))?;
        Ok(mask | (1 << button.id))
    })
}

fn parse_input(text: &str, info: &SystemInfo) -> Result<(usize, u32)> {
    let (player, mask) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("input {:?} is not PLAYER:MASK", text))?;
    let player = player
        .trim()
        .parse()
        .with_context(|| format!("bad player index in {:?}", text))?;
    Ok((player, parse_mask(mask, info)?))
}

fn configure_logging(args: &Args, settings: &Settings) -> Result<()> {
    let config = LogConfig::global();
    if let Some(name) = args.log_level.as_ref().or(settings.log_level.as_ref()) {
        let level = LogLevel::from_str(name).ok_or_else(|| anyhow!("unknown log level {:?}", name))?;
        config.set_global_level(level);
    }
    if let Some(path) = args.log_file.as_ref().or(settings.log_file.as_ref()) {
        config
            .set_log_file(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn run_frames(session: &mut Session, count: u32) -> Result<Vec<(FrameBuffer, AudioBuffer)>> {
    (0..count)
        .map(|_| session.run_frame().map_err(anyhow::Error::from))
        .collect()
}

/// Snapshot, run, restore, run again; both runs must match.
fn verify_snapshot(session: &mut Session, frames: u32) -> Result<Option<FrameBuffer>> {
    let blob = session.serialize()?;
    let first = run_frames(session, frames)?;
    session.deserialize(&blob)?;
    let second = run_frames(session, frames)?;

    if let Some(index) = first.iter().zip(&second).position(|(a, b)| a != b) {
        bail!("replay diverged at frame {}", index + 1);
    }
    println!(
        "snapshot verified: {} bytes, {} frames replayed identically",
        blob.len(),
        frames
    );
    Ok(second.into_iter().last().map(|(video, _)| video))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let settings = args
        .config
        .as_deref()
        .map(Settings::load)
        .unwrap_or_default();
    configure_logging(&args, &settings)?;

    let factory = MdFactory;
    let info = factory.system_info();
    if args.info {
        println!("{}", info.to_json());
        if args.rom.is_none() {
            return Ok(());
        }
    }

    let rom_path = args
        .rom
        .as_ref()
        .ok_or_else(|| anyhow!("a ROM path is required"))?;
    let data = fs::read(rom_path).with_context(|| format!("reading {}", rom_path.display()))?;
    let hash = slots::rom_hash(&data);

    let region_name = args
        .region
        .as_deref()
        .or(settings.region.as_deref())
        .unwrap_or("auto");
    let region = Region::parse(region_name)?;

    let mut session = Session::new(factory);
    session.load(RomImage::new(data)?, region)?;
    log::info!(
        "loaded {} ({} Hz)",
        rom_path.display(),
        session.target_frame_rate().unwrap_or_default()
    );

    for (key, value) in &settings.options {
        session.set_option(key, value)?;
    }
    for text in &args.options {
        let (key, value) = parse_option(text)?;
        session.set_option(key, value)?;
    }

    if args.write_config {
        if let Some(path) = &args.config {
            merged_settings(&settings, &args)?.save(path)?;
            log::info!("settings written to {}", path.display());
        }
    }

    if let Some(path) = &args.sram {
        if !session.supports_persistent_memory() {
            log::warn!("cartridge has no battery RAM; ignoring --sram");
        } else if path.exists() {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            session.set_persistent_memory(&bytes)?;
        }
    }

    let saves_dir = settings
        .saves_dir
        .clone()
        .unwrap_or_else(slots::default_saves_dir);
    if let Some(path) = &args.load_state {
        let blob = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        session.deserialize(&blob)?;
    }
    if let Some(slot) = args.load_slot {
        let blob = GameSaves::load(&saves_dir, &hash).load_slot(slot, &hash)?;
        session.deserialize(&blob)?;
    }

    for text in &args.inputs {
        let (player, mask) = parse_input(text, info)?;
        session.set_input(player, mask)?;
    }

    let last_frame = if args.verify_snapshot {
        verify_snapshot(&mut session, args.frames)?
    } else {
        run_frames(&mut session, args.frames)?
            .into_iter()
            .last()
            .map(|(video, _)| video)
    };

    if let Some(path) = &args.screenshot {
        match &last_frame {
            Some(frame) => screenshot::write_png(path, frame)?,
            None => log::warn!("no frames were run; skipping screenshot"),
        }
    }

    if let Some(path) = &args.save_state {
        fs::write(path, session.serialize()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(slot) = args.save_slot {
        let mut saves = GameSaves::load(&saves_dir, &hash);
        if saves.has_slot(slot) {
            log::info!("overwriting save slot {}", slot);
        }
        saves.save_slot(&saves_dir, slot, &session.serialize()?, &hash)?;
    }

    if let Some(path) = &args.sram {
        if session.supports_persistent_memory() {
            fs::write(path, session.persistent_memory()?)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }

    println!("ran {} frame(s)", args.frames);
    session.unload();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option() {
        assert_eq!(parse_option("six_button=false").unwrap(), ("six_button", "false"));
        assert_eq!(parse_option("k=a=b").unwrap(), ("k", "a=b"));
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=x").is_err());
    }

    #[test]
    fn test_parse_input() {
        let info = emu_md::system_info();
        assert_eq!(parse_input("0:0x90", info).unwrap(), (0, 0x90));
        assert_eq!(parse_input("1:128", info).unwrap(), (1, 128));
        assert_eq!(parse_input("0:Right+A", info).unwrap(), (0, (1 << 3) | (1 << 4)));
        assert_eq!(parse_input("0:start", info).unwrap(), (0, 1 << 7));
        assert!(parse_input("0:Select", info).is_err());
        assert!(parse_input("x:1", info).is_err());
        assert!(parse_input("01", info).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "emu_cli",
            "game.md",
            "--frames",
            "10",
            "--option",
            "interlace=double",
            "--input",
            "0:A",
            "--input",
            "1:B",
            "--verify-snapshot",
        ])
        .unwrap();
        assert_eq!(args.frames, 10);
        assert_eq!(args.options, vec!["interlace=double"]);
        assert_eq!(args.inputs.len(), 2);
        assert!(args.verify_snapshot);
        assert!(args.save_slot.is_none());
        assert!(!args.write_config);
    }

    #[test]
    fn test_write_config_requires_config() {
        assert!(Args::try_parse_from(["emu_cli", "game.md", "--write-config"]).is_err());
    }

    #[test]
    fn test_merged_settings() {
        let mut settings = Settings::default();
        settings.region = Some("ntsc".to_string());
        settings.options.insert("six_button".to_string(), "false".to_string());
        let args = Args::try_parse_from([
            "emu_cli",
            "game.md",
            "--region",
            "pal",
            "--option",
            "interlace=double",
            "--option",
            "six_button=true",
            "--config",
            "settings.json",
            "--write-config",
        ])
        .unwrap();
        let merged = merged_settings(&settings, &args).unwrap();
        assert_eq!(merged.region.as_deref(), Some("pal"));
        assert_eq!(merged.options["six_button"], "true");
        assert_eq!(merged.options["interlace"], "double");

        let bad = Args::try_parse_from(["emu_cli", "--option", "novalue"]).unwrap();
        assert!(merged_settings(&settings, &bad).is_err());
    }
}
