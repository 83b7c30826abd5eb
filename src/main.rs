use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use jasoos::agent::Agent;
use jasoos::camera::{self, CameraManager, CameraSettings, SnapshotCapture};
use jasoos::config::Config;
use jasoos::llm::ChatClient;
use jasoos::session::{ChatHistory, Conversation};
use jasoos::ui::{self, UiState};
use jasoos::vision::{ImageAnalysisTool, VisionClient};
use jasoos::voice::{SpeechRecorder, SpeechToText, TextToSpeech};

/// Voice assistant that can look through your webcam
#[derive(Parser, Debug)]
#[command(name = "jasoos")]
#[command(version, about = "Voice assistant with a webcam preview", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (must exist when given)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the UI and run the voice loop (default)
    Run,
    /// List available cameras
    ListCameras,
    /// Capture one webcam frame to a JPEG file
    Snapshot {
        /// Output file
        out: PathBuf,
    },
    /// Ask the agent one question and print the answer
    Ask {
        /// The question
        question: String,
    },
}

fn load_env() {
    // Existing env vars win over .env; a missing .env is fine
    let _ = dotenv::dotenv();

    for key in ["GOOGLE_API_KEY", "GROQ_API_KEY", "ELEVENLABS_API_KEY"] {
        if std::env::var(key).is_err() {
            eprintln!("Warning: {} environment variable not set.", key);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => Config::load_from_explicit(path.to_path_buf()),
        None => Config::load(None),
    }
    .map_err(|e| e.to_string())
}

fn main() {
    load_env();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        None | Some(Commands::Run) => run_app(config),
        Some(Commands::ListCameras) => list_cameras(),
        Some(Commands::Snapshot { out }) => run_snapshot(&config, &out),
        Some(Commands::Ask { question }) => run_ask(config, &question),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn list_cameras() -> Result<(), String> {
    let devices = camera::list_devices().map_err(|e| e.to_string())?;
    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    for device in devices {
        println!("  [{}] {} ({})", device.index, device.name, device.description);
    }
    Ok(())
}

fn run_snapshot(config: &Config, out: &Path) -> Result<(), String> {
    let settings = config.camera.settings().map_err(|e| e.to_string())?;
    let snapshot = SnapshotCapture::native(settings);
    let jpeg = snapshot.capture_image().map_err(|e| e.to_string())?;
    std::fs::write(out, &jpeg).map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;

    if let Some(identity) = snapshot.identity() {
        println!("Captured {} bytes from {} to {}", jpeg.len(), identity, out.display());
    }
    Ok(())
}

fn run_ask(config: Config, question: &str) -> Result<(), String> {
    let settings = config.camera.settings().map_err(|e| e.to_string())?;
    let agent = build_agent(&config, settings)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;
    let answer = rt.block_on(agent.ask(question));
    println!("{}", answer);
    Ok(())
}

fn build_agent(config: &Config, settings: CameraSettings) -> Result<Agent, String> {
    let client = ChatClient::from_env(
        &config.agent.api_key_env,
        &config.agent.base_url,
        &config.agent.model,
    )
    .map_err(|e| e.to_string())?
    .with_temperature(config.agent.temperature);

    let mut agent = Agent::new(client);
    if let Some(prompt) = &config.agent.system_prompt {
        agent = agent.with_system_prompt(prompt.clone());
    }

    match ChatClient::from_env(
        &config.vision.api_key_env,
        &config.vision.base_url,
        &config.vision.model,
    ) {
        Ok(client) => {
            let tool = ImageAnalysisTool::new(
                Arc::new(SnapshotCapture::native(settings)),
                VisionClient::new(client),
            )
            .with_cooldown(Duration::from_millis(config.vision.cooldown_ms));
            agent = agent.with_tool(Arc::new(tool));
        }
        Err(e) => log::warn!("Image analysis disabled: {}", e),
    }

    Ok(agent)
}

fn build_tts(config: &Config) -> Option<TextToSpeech> {
    if !config.tts.enabled {
        return None;
    }

    match TextToSpeech::from_env(&config.tts.base_url, &config.tts.voice_id, &config.tts.model) {
        Ok(tts) => Some(tts.with_output_format(&config.tts.output_format)),
        Err(e) => {
            log::warn!("Speech output disabled: {}", e);
            None
        }
    }
}

fn run_app(config: Config) -> Result<(), String> {
    let settings = config.camera.settings().map_err(|e| e.to_string())?;
    let listen = config.listen.settings().map_err(|e| e.to_string())?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let history = ChatHistory::new();
    let state = Arc::new(UiState {
        camera: Arc::new(CameraManager::native(settings.clone())),
        history: history.clone(),
        frame_interval: Duration::from_millis(config.server.frame_interval_ms),
    });

    let agent = build_agent(&config, settings)?;
    let stt = SpeechToText::from_env(&config.stt.base_url, &config.stt.model, &config.stt.language);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        match stt {
            Ok(stt) => {
                let conversation = Conversation {
                    recorder: SpeechRecorder::new(listen),
                    stt,
                    agent,
                    tts: build_tts(&config),
                    speech_output: config.tts.output_path.clone(),
                    history,
                };
                tokio::spawn(async move {
                    conversation.run().await;
                    log::info!("Voice loop ended; the UI keeps running");
                });
            }
            Err(e) => log::warn!("Voice loop disabled: {}", e),
        }

        tokio::select! {
            result = ui::serve(addr, state) => result.map_err(|e| e.to_string()),
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                Ok(())
            }
        }
    })
}
