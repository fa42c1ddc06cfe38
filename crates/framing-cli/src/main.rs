use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use framing_core::{
    generate_advice, status_summary, AdvisorySession, DetectionRecord, GateDecision,
    ReferenceComposition, TargetSize, ThrottleConfig,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "framing", about = "Framing assistant diagnostics")]
struct Cli {
    /// Composition goal: full-body, half-body or portrait
    #[arg(long, global = true, default_value = "half-body")]
    target: TargetSize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one detection record (JSON argument, or stdin when omitted)
    Advise {
        record: Option<String>,
        /// Print the advice as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the status summary sent to the suggestion service
    Summary { record: Option<String> },
    /// Dry-run a recorded detection stream through the readiness gate
    Replay {
        /// JSON lines file, one detection record per frame
        file: PathBuf,
        /// Frame rate used to synthesise timestamps
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Photos allowed before the session ends
        #[arg(long, default_value_t = 3)]
        max_photos: u32,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let reference = ReferenceComposition::default();

    match cli.command {
        Commands::Advise { record, json } => {
            let detection = read_record(record)?;
            let advice = generate_advice(&detection, &reference, cli.target);
            if json {
                println!("{}", serde_json::to_string_pretty(&advice)?);
            } else {
                println!("{}", advice.text);
                println!("capture ready: {}", advice.capture_ready);
            }
        }
        Commands::Summary { record } => {
            let detection = read_record(record)?;
            println!("{}", status_summary(&detection));
        }
        Commands::Replay {
            file,
            fps,
            max_photos,
            json,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let config = ThrottleConfig {
                max_photos_per_session: max_photos,
                ..ThrottleConfig::default()
            };
            let report = dry_run(&text, &reference, cli.target, config, fps.max(1));
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            for event in &report.events {
                println!("{event}");
            }
            println!(
                "{} frames, {} invalid, {} photos, {} suggestion requests",
                report.frames, report.invalid, report.photos, report.suggestion_requests
            );
        }
    }

    Ok(())
}

fn read_record(arg: Option<String>) -> Result<DetectionRecord> {
    let text = match arg {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    let record: DetectionRecord =
        serde_json::from_str(text.trim()).context("invalid detection record")?;
    record.validate()?;
    Ok(record)
}

/// Outcome of a replay dry run.
#[derive(Debug, Default, Serialize)]
struct DryRun {
    frames: usize,
    invalid: usize,
    photos: u32,
    suggestion_requests: usize,
    events: Vec<String>,
}

/// Feed every record through the aggregator, the gate and the suggestion
/// throttle at `fps`, treating each capture as saved and each suggestion as
/// answered immediately.
fn dry_run(
    text: &str,
    reference: &ReferenceComposition,
    target: TargetSize,
    config: ThrottleConfig,
    fps: u32,
) -> DryRun {
    let mut session = AdvisorySession::new(config);
    let mut report = DryRun::default();
    let frame_time = Duration::from_secs(1) / fps;
    let t0 = Instant::now();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let frame = report.frames;
        report.frames += 1;
        let now = t0 + frame_time * frame as u32;

        let detection = match serde_json::from_str::<DetectionRecord>(line)
            .map_err(|e| e.to_string())
            .and_then(|d| d.validate().map(|_| d).map_err(|e| e.to_string()))
        {
            Ok(detection) => detection,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping record");
                report.invalid += 1;
                continue;
            }
        };

        let advice = generate_advice(&detection, reference, target);
        if let GateDecision::Capture(ticket) = session.observe_readiness(advice.capture_ready) {
            session.finish_capture(ticket, true);
            report
                .events
                .push(format!("frame {frame}: capture ({})", advice.text));
        }

        if let Some(ticket) = session.try_begin_suggestion(&detection, now) {
            report.suggestion_requests += 1;
            report
                .events
                .push(format!("frame {frame}: suggest [{}]", status_summary(&detection)));
            session.finish_suggestion::<()>(ticket, Ok(advice.text.clone()), now);
        }

        if session.is_complete() {
            report.events.push(format!("frame {frame}: session complete"));
            break;
        }
    }

    report.photos = session.photo_count();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const READY: &str = r#"{"face_detected": true, "bbox": {"cx": 0.5, "cy": 0.5, "width": 0.4, "height": 0.6}, "smile": true, "body_pose": "center"}"#;
    const AWAY: &str = r#"{"face_detected": false}"#;

    fn run(lines: &[&str], max_photos: u32) -> DryRun {
        let config = ThrottleConfig {
            max_photos_per_session: max_photos,
            ..ThrottleConfig::default()
        };
        dry_run(
            &lines.join("\n"),
            &ReferenceComposition::default(),
            TargetSize::HalfBody,
            config,
            30,
        )
    }

    #[test]
    fn test_dry_run_counts_one_capture_per_pose() {
        let mut lines = vec![READY; 10];
        lines.push(AWAY);
        lines.extend(vec![READY; 10]);
        let report = run(&lines, 5);
        assert_eq!(report.photos, 2);
        assert_eq!(report.frames, 21);
    }

    #[test]
    fn test_dry_run_stops_at_photo_bound() {
        let lines: Vec<&str> = (0..20)
            .flat_map(|_| [READY, READY, READY, AWAY])
            .collect();
        let report = run(&lines, 2);
        assert_eq!(report.photos, 2);
        assert!(report.events.last().unwrap().ends_with("session complete"));
        assert!(report.frames < lines.len());
    }

    #[test]
    fn test_dry_run_skips_invalid_lines() {
        let report = run(&[READY, "garbage", r#"{"face_detected": true}"#, READY], 3);
        assert_eq!(report.invalid, 2);
        assert_eq!(report.frames, 4);
    }

    #[test]
    fn test_dry_run_throttles_suggestions() {
        // 20 seconds at 30 fps, alternating subject state every frame.
        let lines: Vec<&str> = (0..600).map(|i| if i % 2 == 0 { READY } else { AWAY }).collect();
        let report = run(&lines, 3);
        assert_eq!(report.photos, 0);
        assert_eq!(report.suggestion_requests, 2);
    }

    #[test]
    fn test_read_record_rejects_inconsistent_record() {
        assert!(read_record(Some(r#"{"face_detected": true}"#.into())).is_err());
        assert!(read_record(Some(READY.into())).is_ok());
    }
}
