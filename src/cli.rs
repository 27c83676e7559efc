// ============================================================================
// maskpaint CLI: replay pointer events over an image and its mask batch
// ============================================================================
//
// Usage examples:
//   maskpaint photo.png masks.json
//   maskpaint photo.png masks.json events.txt out.png
//   maskpaint photo.png masks.json events.txt --export painted.png
//
// Event files hold one command per line, in canvas coordinates:
//   move 120 40
//   click 120 40
//   shift-click 300 200
//   right-click 120 40
//   paint #ff3366 [opacity]
//   show-all on|off

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use maskpaint::cache::CacheManager;
use maskpaint::config::{EngineConfig, OverlayColor};
use maskpaint::domain::{InteractionMode, MaskId, Modifiers, PointerButton};
use maskpaint::engine::Engine;
use maskpaint::generator::FileGenerator;
use maskpaint::render::image::{encode_mask_png, save_png};
use maskpaint::session::{Msg, PointerEvent};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Interactive mask selection, replayed from the command line
#[derive(Parser, Debug)]
#[command(name = "maskpaint", about = "Select and recolor segmentation masks over an image")]
pub struct CliArgs {
    /// Image to edit
    pub image: PathBuf,

    /// Mask batch JSON (array of records or {"masks": [...]})
    pub masks: PathBuf,

    /// Event script to replay
    pub events: Option<PathBuf>,

    /// Where to write the rendered frame (default: <image>.maskpaint.png)
    pub output: Option<PathBuf>,

    /// Write the image with committed paint only, without highlights
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Write the union of the final selection as a binary mask PNG
    #[arg(long, value_name = "FILE")]
    pub selection_mask: Option<PathBuf>,

    /// Membership threshold override (0-255)
    #[arg(long)]
    pub threshold: Option<u8>,

    /// Bypass the mask cache entirely
    #[arg(long)]
    pub no_cache: bool,

    /// Drop every cache entry before loading
    #[arg(long)]
    pub clear_cache: bool,

    /// Canvas size as WIDTHxHEIGHT (default: image size)
    #[arg(long, value_name = "WxH")]
    pub canvas: Option<String>,
}

// ============================================================================
// Event script
// ============================================================================

#[derive(Debug, Clone)]
pub enum Command {
    Pointer(PointerEvent),
    Paint {
        color: OverlayColor,
        opacity: Option<f32>,
    },
    Msg(Msg),
}

fn coords(args: &[&str], line: &str) -> Result<(f32, f32)> {
    let [x, y] = args else {
        bail!("expected two coordinates in {:?}", line);
    };
    let x = x.parse().with_context(|| format!("bad x coordinate in {:?}", line))?;
    let y = y.parse().with_context(|| format!("bad y coordinate in {:?}", line))?;
    Ok((x, y))
}

/// Parse one line of an event script; blank lines and `//` comments yield None
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb {
        "move" => {
            let (x, y) = coords(&args, line)?;
            Command::Pointer(PointerEvent::moved(x, y))
        }
        "click" => {
            let (x, y) = coords(&args, line)?;
            Command::Pointer(PointerEvent::click(x, y))
        }
        "shift-click" => {
            let (x, y) = coords(&args, line)?;
            Command::Pointer(PointerEvent::press(
                x,
                y,
                PointerButton::Primary,
                Modifiers::extend(),
            ))
        }
        "right-click" => {
            let (x, y) = coords(&args, line)?;
            Command::Pointer(PointerEvent::press(
                x,
                y,
                PointerButton::Secondary,
                Modifiers::NONE,
            ))
        }
        "leave" => Command::Pointer(PointerEvent::leave()),
        "paint" => {
            let Some(hex) = args.first() else {
                bail!("paint needs a color in {:?}", line);
            };
            let color = OverlayColor::from_hex(hex)?;
            let opacity = match args.get(1) {
                Some(value) => Some(
                    value
                        .parse()
                        .with_context(|| format!("bad opacity in {:?}", line))?,
                ),
                None => None,
            };
            Command::Paint { color, opacity }
        }
        "unpaint" => {
            let id = args
                .first()
                .context("unpaint needs a mask id")?
                .trim_start_matches('#')
                .parse()
                .with_context(|| format!("bad mask id in {:?}", line))?;
            Command::Msg(Msg::Unpaint(MaskId(id)))
        }
        "clear-paint" => Command::Msg(Msg::ClearPaint),
        "select-all" => Command::Msg(Msg::SelectAll),
        "clear" => Command::Msg(Msg::ClearSelection),
        "show-all" => match args.first().copied() {
            Some("on") => Command::Msg(Msg::SetShowAll(true)),
            Some("off") => Command::Msg(Msg::SetShowAll(false)),
            _ => bail!("show-all takes on|off in {:?}", line),
        },
        "mode" => match args.first().copied() {
            Some("select") => Command::Msg(Msg::SetMode(InteractionMode::Select)),
            Some("generate") => Command::Msg(Msg::SetMode(InteractionMode::Generate)),
            _ => bail!("mode takes select|generate in {:?}", line),
        },
        "resize" => {
            let (w, h) = coords(&args, line)?;
            Command::Msg(Msg::Resize(w, h))
        }
        other => bail!("unknown command {:?}", other),
    };
    Ok(Some(command))
}

fn parse_canvas(value: &str) -> Result<(f32, f32)> {
    let (w, h) = value
        .split_once('x')
        .with_context(|| format!("canvas must be WIDTHxHEIGHT, got {:?}", value))?;
    Ok((
        w.parse().with_context(|| format!("bad canvas width {:?}", w))?,
        h.parse().with_context(|| format!("bad canvas height {:?}", h))?,
    ))
}

fn default_output(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    image.with_file_name(format!("{stem}.maskpaint.png"))
}

// ============================================================================
// Public entry point
// ============================================================================

pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = EngineConfig::load();
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if args.no_cache {
        config.cache_enabled = false;
    }

    let mut cache = CacheManager::from_config(&config);
    if args.clear_cache {
        cache.clear();
    }

    let generator = FileGenerator::new(&args.masks);
    let mut engine = Engine::new(config, generator, cache);

    if let Some(size) = &args.canvas {
        let (w, h) = parse_canvas(size)?;
        engine.handle_msg(Msg::Resize(w, h));
    }

    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let report = engine.open_image(&bytes).await?;
    println!(
        "{}: {} masks{}{}",
        args.image.display(),
        report.masks,
        if report.from_cache { " (cached)" } else { "" },
        if report.skipped.is_empty() {
            String::new()
        } else {
            format!(", {} skipped", report.skipped.len())
        }
    );

    if let Some(path) = &args.events {
        let script = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        for (number, line) in script.lines().enumerate() {
            let command = parse_command(line)
                .with_context(|| format!("{}:{}", path.display(), number + 1))?;
            let outcome = match command {
                None => continue,
                Some(Command::Pointer(event)) => engine.handle_pointer(event).await?,
                Some(Command::Paint { color, opacity }) => match opacity {
                    Some(opacity) => engine.handle_msg(Msg::Paint { color, opacity }),
                    None => engine.paint(color),
                },
                Some(Command::Msg(msg)) => engine.handle_msg(msg),
            };
            log::debug!("{}: {:?}", line.trim(), outcome);
        }
    }

    let selection: Vec<String> = engine
        .session()
        .selection()
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!(
        "selected: [{}], painted: {}",
        selection.join(", "),
        engine.session().painted().len()
    );

    let output = args.output.clone().unwrap_or_else(|| default_output(&args.image));
    let Some(frame) = engine.render_image() else {
        bail!("Nothing to render");
    };
    save_png(&frame, &output)?;

    if let Some(path) = &args.export
        && let Some(img) = engine.export()
    {
        save_png(&img, path)?;
    }

    if let Some(path) = &args.selection_mask {
        let png = encode_mask_png(&engine.selection_mask())?;
        tokio::fs::write(path, png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let status = engine.cache_status();
    log::info!(
        "Cache: {} entries, {} masks, {} embeddings (enabled: {})",
        status.entries,
        status.total_cached_masks,
        status.embeddings,
        status.enabled
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskpaint::session::PointerKind;

    #[test]
    fn test_parse_pointer_commands() {
        let Some(Command::Pointer(event)) = parse_command("shift-click 10 20.5").unwrap() else {
            panic!("expected pointer event");
        };
        assert_eq!(event.kind, PointerKind::Press(PointerButton::Primary));
        assert!(event.modifiers.extend);
        assert_eq!((event.x, event.y), (10.0, 20.5));

        let Some(Command::Pointer(event)) = parse_command("right-click 1 2").unwrap() else {
            panic!("expected pointer event");
        };
        assert_eq!(event.kind, PointerKind::Press(PointerButton::Secondary));
    }

    #[test]
    fn test_parse_paint_and_toggles() {
        let Some(Command::Paint { color, opacity }) = parse_command("paint #ff0000 0.5").unwrap()
        else {
            panic!("expected paint");
        };
        assert_eq!(color, OverlayColor::rgb(1.0, 0.0, 0.0));
        assert_eq!(opacity, Some(0.5));

        assert!(matches!(
            parse_command("show-all on").unwrap(),
            Some(Command::Msg(Msg::SetShowAll(true)))
        ));
        assert!(matches!(
            parse_command("unpaint #4").unwrap(),
            Some(Command::Msg(Msg::Unpaint(MaskId(4))))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_command("").unwrap().is_none());
        assert!(parse_command("// note").unwrap().is_none());
        assert!(parse_command("click 1").is_err());
        assert!(parse_command("paint red").is_err());
        assert!(parse_command("show-all maybe").is_err());
        assert!(parse_command("jump 1 2").is_err());
    }

    #[test]
    fn test_parse_canvas_and_default_output() {
        assert_eq!(parse_canvas("640x480").unwrap(), (640.0, 480.0));
        assert!(parse_canvas("640").is_err());
        assert_eq!(
            default_output(Path::new("/tmp/cat.jpg")),
            PathBuf::from("/tmp/cat.maskpaint.png")
        );
    }
}
