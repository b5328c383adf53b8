//! Human-readable view of a pipeline report

use ecg_processing::{PipelineReport, PredictionClass};
use std::fmt::Write;

/// One line per stage followed by tensor, prediction and ground truth
pub fn render(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Report {}", report.id);
    let _ = writeln!(
        out,
        "Input: {} samples x {} channels at {} Hz",
        report.signal_original.samples_per_channel(),
        report.signal_original.channel_count(),
        report.signal_original.sampling_rate().hz()
    );

    for (kind, status, message) in report.stages.summary() {
        let _ = writeln!(out, "  {:<14} {:<9} {}", kind.label(), format!("{:?}", status).to_uppercase(), message);
    }

    match report.tensor_shape {
        Some(shape) => {
            let _ = writeln!(out, "Tensor: {:?}", shape);
        }
        None => {
            let _ = writeln!(out, "Tensor: not produced");
        }
    }

    match &report.prediction {
        Some(prediction) => {
            let class = match prediction.class {
                PredictionClass::Anomalous => "anomalous",
                PredictionClass::Normal => "normal",
            };
            let _ = writeln!(
                out,
                "Prediction: {} (score {:.3}) from {}",
                class, prediction.score, report.model.name
            );
        }
        None => {
            let _ = writeln!(out, "Prediction: none");
        }
    }

    if let Some(truth) = report.ground_truth {
        let _ = writeln!(
            out,
            "Ground truth: label {} ({})",
            truth.label,
            if truth.is_anomalous { "anomalous" } else { "normal" }
        );
    }

    let _ = writeln!(out, "Stage time: {} us", report.total_elapsed_us());
    out
}
