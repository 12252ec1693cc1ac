//! ULSVG CLI - Bridge interface for scripts
//!
//! Commands: ratios, regions, position, validate, analyze, generate
//! Outputs JSON to stdout
//! Returns 2 on validation failure or complete generation failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ulsvg_core::{
    canvas::AspectRatio,
    layers::LayerAnalyzer,
    validation::generate_model_feedback,
    CoordinateMapper, DocumentValidator, EngineConfig, GenerationOrchestrator, GenerationRequest,
    LayoutSpecification, OfflineGenerator, RegionResolver, UnifiedLayeredDocument, ValidateOptions,
};

#[derive(Parser)]
#[command(name = "ulsvg-cli")]
#[command(about = "ULSVG CLI - Unified-Layered SVG Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON engine config
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List canonical canvases
    Ratios,

    /// List regions with pixel bounds
    Regions {
        #[arg(short, long, default_value = "1:1")]
        ratio: AspectRatio,
    },

    /// Resolve a layout specification to pixels
    Position {
        #[arg(short, long, default_value = "1:1")]
        ratio: AspectRatio,

        /// JSON payload (LayoutSpecification)
        #[arg(short, long)]
        spec: String,
    },

    /// Validate a document file
    Validate {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        auto_fix: bool,

        /// Include model feedback hints
        #[arg(long)]
        feedback: bool,
    },

    /// Analyze the layers of a document file
    Analyze {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generate offline through the fallback chain
    Generate {
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long)]
        ratio: Option<String>,

        /// Display size such as 1920x1080
        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        /// Comma-separated #RRGGBB colors
        #[arg(long)]
        palette: Option<String>,

        /// Attempts per tier
        #[arg(long, default_value_t = 1)]
        max_retries: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

fn fail(message: String) -> ExitCode {
    println!("{}", serde_json::json!({ "success": false, "error": message }));
    ExitCode::FAILURE
}

fn read_document(path: &PathBuf) -> Result<UnifiedLayeredDocument, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    UnifiedLayeredDocument::from_json(&text).map_err(|e| format!("Invalid document: {}", e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return fail(e.to_string()),
        },
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Ratios => {
            let canvases: Vec<_> = AspectRatio::ALL.iter().map(|r| r.config()).collect();
            print_json(&canvases)
        }

        Commands::Regions { ratio } => {
            let resolver = RegionResolver::new(ratio);
            let regions: Vec<_> = resolver
                .region_names()
                .into_iter()
                .filter_map(|name| {
                    let bounds = resolver.pixel_bounds(&name).ok()?;
                    Some(serde_json::json!({ "name": name, "bounds": bounds }))
                })
                .collect();
            print_json(&regions)
        }

        Commands::Position { ratio, spec } => {
            let spec: LayoutSpecification = match serde_json::from_str(&spec) {
                Ok(s) => s,
                Err(e) => return fail(format!("Invalid payload: {}", e)),
            };
            let mapper = CoordinateMapper::new(RegionResolver::new(ratio));
            match mapper.calculate_position(&spec) {
                Ok(position) => print_json(&position),
                Err(e) => {
                    println!("{}", serde_json::json!({ "success": false, "error": e.to_string() }));
                    ExitCode::from(2)
                }
            }
        }

        Commands::Validate { file, auto_fix, feedback } => {
            let text = match fs::read_to_string(&file) {
                Ok(t) => t,
                Err(e) => return fail(format!("Failed to read {}: {}", file.display(), e)),
            };
            let validator = DocumentValidator::with_thresholds(config.validation.clone());
            let report = validator.validate_json(&text, ValidateOptions { auto_fix });
            let output = if feedback {
                serde_json::json!({ "report": report, "feedback": generate_model_feedback(&report) })
            } else {
                serde_json::json!({ "report": report })
            };
            let code = print_json(&output);
            if report.success {
                code
            } else {
                ExitCode::from(2) // Validation failure
            }
        }

        Commands::Analyze { file } => {
            let doc = match read_document(&file) {
                Ok(d) => d,
                Err(e) => return fail(e),
            };
            let resolver = match RegionResolver::with_custom_regions(
                doc.aspect_ratio().unwrap_or_default(),
                doc.custom_regions(),
            ) {
                Ok(r) => r,
                Err(e) => return fail(e.to_string()),
            };
            let mut analyzer = LayerAnalyzer::with_thresholds(config.layers.clone()).with_resolver(resolver);
            let (w, h) = (doc.canvas.width, doc.canvas.height);
            let output = serde_json::json!({
                "layers": doc.layers.iter().map(|l| analyzer.analyze_layer(l, w, h)).collect::<Vec<_>>(),
                "validation": analyzer.validate_layers(&doc.layers),
                "statistics": analyzer.layer_statistics(&doc.layers, w, h),
                "hierarchy": analyzer.create_layer_hierarchy(&doc.layers),
                "groups": analyzer.group_layers_by_purpose(&doc.layers),
                "optimization": analyzer.optimize_layers(&doc.layers),
            });
            print_json(&output)
        }

        Commands::Generate { prompt, ratio, size, seed, palette, max_retries } => {
            let request = GenerationRequest {
                size,
                aspect_ratio: ratio,
                seed,
                palette: palette.map(|p| p.split(',').map(|c| c.trim().to_string()).collect()),
                max_retries: Some(max_retries),
                ..GenerationRequest::new(&prompt)
            };
            let orchestrator = GenerationOrchestrator::with_config(Arc::new(OfflineGenerator), config);
            let response = orchestrator.handle_generation_with_fallbacks(&request).await;
            let code = print_json(&response);
            if response.is_complete_failure() {
                ExitCode::from(2)
            } else {
                code
            }
        }
    }
}
