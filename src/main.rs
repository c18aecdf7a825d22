use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "drawing-translator",
    version,
    about = "Replace text blocks in technical drawings with their translations"
)]
struct Cli {
    /// Drawing to translate (png, jpg, webp, bmp, tiff, gif)
    #[arg(short = 'i', long = "image")]
    image: PathBuf,

    /// Output image; the extension selects the encoder
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Use annotated regions from a JSON file instead of calling the vision model
    #[arg(short = 'r', long = "regions")]
    regions: Option<PathBuf>,

    /// Write the regions that were used to a JSON file
    #[arg(long = "dump-regions")]
    dump_regions: Option<PathBuf>,

    /// Target language (default from settings: zh)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Source language. Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Gemini model name (e.g. gemini-2.5-flash or gemini:MODEL_ID)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides GEMINI_API_KEY / GOOGLE_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Smallest font size tried when fitting text
    #[arg(long = "min-font-size")]
    min_font_size: Option<f32>,

    /// Largest font size tried when fitting text
    #[arg(long = "max-font-size")]
    max_font_size: Option<f32>,

    /// Pixels added around each region before erasing
    #[arg(long = "padding")]
    padding: Option<f32>,

    /// Read extra settings from a local TOML file
    #[arg(long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    drawing_translator::logging::init(cli.verbose)?;

    let output = drawing_translator::run(drawing_translator::Config {
        image: cli.image,
        output: cli.output,
        regions: cli.regions,
        dump_regions: cli.dump_regions,
        lang: cli.lang,
        source_lang: cli.source_lang,
        model: cli.model,
        key: cli.key,
        settings_path: cli.read_settings,
        min_font_size: cli.min_font_size,
        max_font_size: cli.max_font_size,
        padding: cli.padding,
    })
    .await?;

    println!("{}", output);
    Ok(())
}
