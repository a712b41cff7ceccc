//! QR batch input parsing, symbol encoding, and per-job execution.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use crate::TrailError;

/// Edge length of one QR module in output pixels.
const MODULE_PX: u32 = 10;

/// One accepted input record: a normalized file label and the payload to
/// encode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrJob {
    pub label: String,
    pub payload: String,
}

/// An input line that was rejected during parsing. `line` is 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct ParsedLines {
    pub jobs: Vec<QrJob>,
    pub skipped: Vec<SkippedLine>,
}

/// Result of one batch job. Failures carry the offending payload so callers
/// can report it without re-reading the input.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Written {
        label: String,
        path: PathBuf,
    },
    Failed {
        label: String,
        payload: String,
        reason: String,
    },
}

/// Read `name,link` records line by line.
///
/// Blank lines are dropped silently. Lines without a comma are recorded as
/// skipped under their 1-based line number. Only the first comma splits a
/// line, so the payload may itself contain commas. An empty label after
/// normalization becomes `qr_link_<n>`, counting accepted jobs from 1.
pub fn parse_jobs(reader: impl BufRead) -> Result<ParsedLines, TrailError> {
    let mut parsed = ParsedLines::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((raw_label, raw_payload)) = line.split_once(',') else {
            parsed.skipped.push(SkippedLine {
                line: idx + 1,
                reason: "missing ',' separator".to_string(),
            });
            continue;
        };
        let mut label = normalize_label(raw_label);
        if label.is_empty() {
            label = format!("qr_link_{}", parsed.jobs.len() + 1);
        }
        parsed.jobs.push(QrJob {
            label,
            payload: raw_payload.trim().to_string(),
        });
    }
    Ok(parsed)
}

/// Trim, lowercase, and replace internal spaces with underscores.
fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Encode `payload` as a QR symbol and rasterize it black-on-white.
///
/// The symbol version is the smallest that holds the payload at
/// error-correction level H. Modules are [`MODULE_PX`] pixels wide and the
/// standard 4-module quiet zone surrounds the symbol.
pub fn encode_qr(payload: &str) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>, TrailError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H)
        .map_err(|e| TrailError::QrEncode(e.to_string()))?;
    Ok(code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PX, MODULE_PX)
        .quiet_zone(true)
        .build())
}

/// Run every job in order, writing `<label>.png` into `out_dir`.
///
/// Jobs are independent: a failed encode or save is recorded as an outcome
/// and the batch moves on. Colliding labels overwrite earlier output.
pub fn run_batch(jobs: &[QrJob], out_dir: &Path) -> Vec<JobOutcome> {
    jobs.iter()
        .map(|job| {
            let path = out_dir.join(format!("{}.png", job.label));
            match write_job(job, &path) {
                Ok(()) => JobOutcome::Written {
                    label: job.label.clone(),
                    path,
                },
                Err(err) => JobOutcome::Failed {
                    label: job.label.clone(),
                    payload: job.payload.clone(),
                    reason: err.to_string(),
                },
            }
        })
        .collect()
}

fn write_job(job: &QrJob, path: &Path) -> Result<(), TrailError> {
    let image = encode_qr(&job.payload)?;
    image
        .save(path)
        .map_err(|e| TrailError::ImageWrite(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trailkit_qr_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_label_normalization() {
        let input = "My Trail, https://example.com/a\n";
        let parsed = parse_jobs(input.as_bytes()).unwrap();
        assert_eq!(
            parsed.jobs,
            vec![QrJob {
                label: "my_trail".to_string(),
                payload: "https://example.com/a".to_string(),
            }]
        );
    }

    #[test]
    fn test_payload_keeps_commas_after_first_delimiter() {
        let parsed = parse_jobs("a,https://example.com/?x=1,y=2\n".as_bytes()).unwrap();
        assert_eq!(parsed.jobs[0].payload, "https://example.com/?x=1,y=2");
    }

    #[test]
    fn test_empty_label_gets_sequential_synthetic_name() {
        let input = "one,https://example.com/1\n\
                     two,https://example.com/2\n\
                     ,https://example.com/3\n";
        let parsed = parse_jobs(input.as_bytes()).unwrap();
        assert_eq!(parsed.jobs[2].label, "qr_link_3");
    }

    #[test]
    fn test_line_without_delimiter_is_skipped_with_line_number() {
        let input = "one,https://example.com/1\n\
                     no-delimiter-here\n\
                     \n\
                     two,https://example.com/2\n";
        let parsed = parse_jobs(input.as_bytes()).unwrap();
        assert_eq!(parsed.jobs.len(), 2);
        assert_eq!(parsed.skipped, vec![SkippedLine {
            line: 2,
            reason: "missing ',' separator".to_string(),
        }]);
    }

    #[test]
    fn test_blank_lines_are_silently_dropped() {
        let parsed = parse_jobs("\n   \n\t\n".as_bytes()).unwrap();
        assert!(parsed.jobs.is_empty());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_encode_produces_square_image_with_quiet_zone() {
        let image = encode_qr("https://example.com").unwrap();
        assert_eq!(image.width(), image.height());
        // Smallest symbol is 21 modules plus a 4-module border on each side.
        assert!(image.width() >= (21 + 8) * MODULE_PX);
        assert_eq!(image.width() % MODULE_PX, 0);
    }

    #[test]
    fn test_batch_isolates_failing_job() {
        let dir = scratch_dir("isolate");
        let oversized = "x".repeat(8000);
        let jobs = vec![
            QrJob {
                label: "first".to_string(),
                payload: "https://example.com/1".to_string(),
            },
            QrJob {
                label: "broken".to_string(),
                payload: oversized,
            },
            QrJob {
                label: "second".to_string(),
                payload: "https://example.com/2".to_string(),
            },
        ];
        let outcomes = run_batch(&jobs, &dir);
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], JobOutcome::Written { .. }));
        assert!(matches!(outcomes[1], JobOutcome::Failed { .. }));
        assert!(matches!(outcomes[2], JobOutcome::Written { .. }));
        assert!(dir.join("first.png").exists());
        assert!(!dir.join("broken.png").exists());
        assert!(dir.join("second.png").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_colliding_labels_overwrite() {
        let dir = scratch_dir("collide");
        let jobs = vec![
            QrJob {
                label: "trail".to_string(),
                payload: "https://example.com/old".to_string(),
            },
            QrJob {
                label: "trail".to_string(),
                payload: "https://example.com/new".to_string(),
            },
        ];
        let outcomes = run_batch(&jobs, &dir);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, JobOutcome::Written { .. })));
        let written: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(written.len(), 1);
        let on_disk = encode_qr("https://example.com/new").unwrap();
        let saved = image::open(dir.join("trail.png")).unwrap().to_luma8();
        assert_eq!(saved.as_raw(), on_disk.as_raw());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = JobOutcome::Failed {
            label: "x".to_string(),
            payload: "y".to_string(),
            reason: "boom".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["payload"], "y");
    }
}
