use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "genrelens", about = "Music genre classifier with audio visualization data")]
pub struct Cli {
    /// Audio files to classify offline (WAV, MP3, FLAC, OGG)
    pub inputs: Vec<PathBuf>,

    /// Run the HTTP API instead of classifying files
    #[arg(long)]
    pub serve: bool,

    /// Address to bind in server mode
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind in server mode
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Classifier model: local path or http(s) URL
    #[arg(short, long, default_value = "model/genre_crnn.onnx")]
    pub model: String,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print each segment's top genre
    #[arg(long)]
    pub segments: bool,

    /// Config file (default: genrelens.toml or ~/.config/genrelens/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value_t = 50)]
    pub max_upload_mb: usize,

    /// Disable permissive CORS headers
    #[arg(long)]
    pub no_cors: bool,
}
