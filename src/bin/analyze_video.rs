use clap::Parser;

use comment_sentiment::{Pipeline, PipelineConfig, PipelineReport, RunRequest, Sentiment};

#[derive(Parser, Debug)]
#[command(
    name = "analyze-video",
    about = "Scrape a video's comments, translate them and classify their sentiment",
    version
)]
struct Args {
    /// Video page URL
    url: String,

    /// API key for the sentiment model (defaults to NVIDIA_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Max in-flight translation/completion requests
    #[arg(short, long)]
    concurrency: Option<usize>,
}

fn print_report(report: &PipelineReport) {
    let total = report.counts.total();
    println!("{}", "=".repeat(60));
    println!("Video: {}", report.video_url);
    println!(
        "Comments: {} extracted, {} classified, {} dropped (coverage {:.1}%)",
        report.extracted,
        total,
        report.dropped,
        report.coverage() * 100.0
    );
    if !report.fully_loaded {
        println!("Note: the page was still loading comments when scrolling stopped");
    }
    for sentiment in Sentiment::ALL {
        println!(
            "  {:<9} {:>4}  ({:.1}%)",
            sentiment.as_str(),
            report.counts.get(sentiment),
            report.counts.percentage(sentiment)
        );
    }
    println!("{}", "-".repeat(60));
    for result in &report.results {
        println!(
            "#{:<4} {:<8} {:>3}%  {}",
            result.index, result.sentiment, result.confidence, result.text
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(key) = args.api_key {
        config = config.with_api_key(key);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }

    let request = RunRequest::new(args.url.trim(), config.completion.api_key.clone());
    let outcome = match request.validate() {
        Ok(()) => match Pipeline::from_config(config) {
            Ok(pipeline) => pipeline.run(&request.video_url).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    match outcome {
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
