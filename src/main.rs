use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fridge_vision::config::AppConfig;
use fridge_vision::detection::ImageSize;
use fridge_vision::llm::{LlmRanker, OllamaClient};
use fridge_vision::pipeline::{DetectionRequest, PipelineContext};
use fridge_vision::RecipeCatalog;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: fridge-vision <command> [args]

Commands:
  analyze <request.json>     Quantify detections and recommend recipes
  recommend <ingredient>...  Recommend recipes for ingredient names
  recipe <id>                Show one recipe
  search <query>             Search recipes by name or ingredient
  list [limit]               List recipes (default 20, max 100)
  ingredients                List every catalog ingredient";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn resolve_image_size(request: &DetectionRequest) -> Result<ImageSize> {
    if let Some(size) = request.image_size() {
        return Ok(size);
    }
    let Some(path) = &request.image_path else {
        bail!("Request needs image_width and image_height, or an image_path");
    };
    let (width, height) = image::image_dimensions(path)
        .with_context(|| format!("Failed to read image dimensions from {}", path.display()))?;
    Ok(ImageSize::new(width, height))
}

async fn analyze(config: &AppConfig, context: &PipelineContext, path: &Path) -> Result<()> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let request: DetectionRequest =
        serde_json::from_str(&body).context("Failed to parse detection request")?;
    let image = resolve_image_size(&request)?;

    let ocr_text = request
        .ocr_text
        .as_deref()
        .filter(|_| config.features.enable_ocr);
    let report = context.analyze(&request.detections, image, ocr_text)?;

    let mut names = report.unique_ingredients.clone();
    for name in &request.ingredients {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    let recommendations = if !config.features.enable_recipe_recommendations {
        None
    } else if config.llm.enabled {
        let client = OllamaClient::new(config.llm.clone())?;
        let response = client
            .generate_recipes(&names, context.config().ranking.top_k)
            .await;
        if let Err(e) = &response {
            warn!(error = %e, "LLM recommendation failed");
        }
        Some(context.recommend_with(&LlmRanker::new(response), &names))
    } else {
        Some(context.recommend(&names))
    };

    #[derive(Serialize)]
    struct AnalyzeOutput<T, R> {
        detection: T,
        recommendations: Option<R>,
    }

    print_json(&AnalyzeOutput {
        detection: report,
        recommendations,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let catalog = Arc::new(RecipeCatalog::load_or_default(config.recipes_file.as_deref()));
    info!(recipes = catalog.len(), "Recipe catalog ready");

    let context = PipelineContext::new(config.pipeline.clone(), Arc::clone(&catalog))
        .context("Invalid pipeline configuration")?;

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    match command.as_str() {
        "analyze" => {
            let Some(path) = args.get(1) else {
                bail!("analyze needs a request file\n\n{USAGE}");
            };
            analyze(&config, &context, Path::new(path)).await
        }
        "recommend" => print_json(&context.recommend(&args[1..])),
        "recipe" => {
            let id: i64 = args
                .get(1)
                .context("recipe needs an id")?
                .parse()
                .context("Recipe id must be an integer")?;
            print_json(&context.find_recipe(id)?)
        }
        "search" => {
            let query = args[1..].join(" ");
            if query.trim().is_empty() {
                bail!("search needs a query");
            }
            print_json(&catalog.search(&query))
        }
        "list" => {
            let limit = match args.get(1) {
                Some(value) => value.parse().context("List limit must be a number")?,
                None => 20,
            };
            print_json(&catalog.list(limit))
        }
        "ingredients" => print_json(&catalog.all_ingredients()),
        other => bail!("Unknown command '{other}'\n\n{USAGE}"),
    }
}
