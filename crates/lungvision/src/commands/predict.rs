//! Predict command - upload a zipped CT study for classification.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};

use lungvision_client::{PredictionResponse, UploadFile};

use super::Context;

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Zip archive of DICOM slices
    pub archive: PathBuf,
}

/// Run the predict command.
pub async fn run(args: PredictArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    let archive = UploadFile::from_path(&args.archive)
        .with_context(|| format!("Failed to read {}", args.archive.display()))?;

    tracing::debug!(file = %archive.file_name, bytes = archive.len(), "Uploading study");
    let prediction = session
        .client()
        .predict()
        .upload(archive)
        .await
        .map_err(|e| ctx.fail(e))?;

    if ctx.json_output {
        return ctx.print_json(&prediction);
    }
    print_prediction(&prediction);
    Ok(())
}

fn print_prediction(prediction: &PredictionResponse) {
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Prediction").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Patient:"), prediction.patient_id);
    println!(
        "  {} {}",
        dim.apply_to("Class:"),
        style(&prediction.predicted_class).bold()
    );
    println!(
        "  {} {:.1}%",
        dim.apply_to("Confidence:"),
        prediction.confidence * 100.0
    );

    if !prediction.class_probabilities.is_empty() {
        let mut probabilities: Vec<_> = prediction.class_probabilities.iter().collect();
        probabilities.sort_by(|a, b| b.1.total_cmp(a.1));

        println!();
        for (class, probability) in probabilities {
            println!("  {:<28} {:>6.1}%", class, probability * 100.0);
        }
    }

    let visualizations = [
        ("Prediction map", &prediction.prediction_visualization),
        ("Attention map", &prediction.attention_visualization),
        ("Feature focus", &prediction.feature_focus_visualization),
    ];
    let available: Vec<_> = visualizations
        .iter()
        .filter(|(_, v)| v.is_some())
        .map(|(name, _)| *name)
        .collect();
    if !available.is_empty() {
        println!();
        println!(
            "  {} {} (use --json to retrieve)",
            dim.apply_to("Visualizations:"),
            available.join(", ")
        );
    }

    if !prediction.message.is_empty() {
        println!();
        println!("{}", prediction.message);
    }
    println!();
}
