use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use kbar_ui::{InputEvent, NavKey, SourceFormat};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum InputFormat {
    Csv,
    Parquet,
}

impl From<InputFormat> for SourceFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Csv => SourceFormat::Csv,
            InputFormat::Parquet => SourceFormat::Parquet,
        }
    }
}

/// Parses a comma separated input script.
///
/// Steps are `key:<left|right|up|down|home>`, `drag:<dx>[:<dy>]`,
/// `wheel:<dx>:<dy>[:<x>:<y>]` and `resize:<w>x<h>`. Wheel events without a
/// cursor position use `center`.
pub fn parse_script(script: &str, center: (f64, f64)) -> Result<Vec<InputEvent>> {
    script
        .split(',')
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(|step| parse_step(step, center).with_context(|| format!("bad script step `{step}`")))
        .collect()
}

fn parse_step(step: &str, center: (f64, f64)) -> Result<InputEvent> {
    let mut parts = step.split(':');
    let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match (kind.as_str(), args.as_slice()) {
        ("key", [key]) => Ok(InputEvent::KeyNav(parse_key(key)?)),
        ("drag", [dx]) => Ok(InputEvent::Drag {
            dx: number(dx)?,
            dy: 0.0,
        }),
        ("drag", [dx, dy]) => Ok(InputEvent::Drag {
            dx: number(dx)?,
            dy: number(dy)?,
        }),
        ("wheel", [dx, dy]) => Ok(InputEvent::Wheel {
            delta_x: number(dx)?,
            delta_y: number(dy)?,
            x: center.0,
            y: center.1,
        }),
        ("wheel", [dx, dy, x, y]) => Ok(InputEvent::Wheel {
            delta_x: number(dx)?,
            delta_y: number(dy)?,
            x: number(x)?,
            y: number(y)?,
        }),
        ("resize", [size]) => {
            let (w, h) = size
                .split_once(['x', 'X'])
                .ok_or_else(|| anyhow!("expected <width>x<height>"))?;
            Ok(InputEvent::Resize {
                width: number(w)?,
                height: number(h)?,
            })
        }
        _ => bail!("unknown step"),
    }
}

fn parse_key(raw: &str) -> Result<NavKey> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "left" => Ok(NavKey::Left),
        "right" => Ok(NavKey::Right),
        "up" => Ok(NavKey::Up),
        "down" => Ok(NavKey::Down),
        "home" => Ok(NavKey::Home),
        other => bail!("unknown key {other}"),
    }
}

fn number(raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid number {raw}"))?;
    if !value.is_finite() {
        bail!("non-finite number {raw}");
    }
    Ok(value)
}
