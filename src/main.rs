use clap::Parser;
use leafy::config::{AppConfig, CONFIG_FILE_NAME};
use leafy::error::{classification_failure_message, AppError};
use leafy::filesystem::get_app_data_dir;
use leafy::picker::{read_image_file, request_image, ImageSource};
use leafy::{
    database, logging, IdentificationWorkflow, PhotoSettings, PlantStore, SessionState,
    SqlitePlantStore,
};
use plant_classifier::ClassifierService;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Identify plants from photos and keep them in your garden
#[derive(Parser)]
#[command(name = "leafy")]
struct Args {
    /// Photos to identify
    images: Vec<PathBuf>,

    /// Save every identified plant to the garden
    #[arg(short, long)]
    save: bool,

    /// List the garden, newest first
    #[arg(short, long)]
    list: bool,

    /// Print the garden listing as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Remove a saved plant
    #[arg(long, value_name = "ID")]
    delete: Option<Uuid>,

    /// Config file, defaults to $LEAFY_CONFIG or leafy.toml in the app data directory
    #[arg(short, long, env = "LEAFY_CONFIG")]
    config: Option<PathBuf>,
}

fn main() {
    logging::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let data_dir = get_app_data_dir();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));
    let config = AppConfig::load(&config_path)?.resolve_paths(&data_dir);

    // A missing model is fatal, there is nothing to identify with
    let classifier = ClassifierService::init(config.classifier.clone())?;
    let conn = database::init_database(&config.storage.database_path)?;
    let store: Arc<dyn PlantStore> = Arc::new(SqlitePlantStore::new(conn));

    if let Some(id) = args.delete {
        store.delete(&id)?;
        println!("Removed {}", id);
    }

    if !args.images.is_empty() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let photo = PhotoSettings::from(&config.storage);
        runtime.block_on(identify_all(&args, classifier, Arc::clone(&store), photo));
    }

    if args.list {
        print_garden(store.as_ref(), args.json)?;
    }

    Ok(())
}

async fn identify_all(
    args: &Args,
    classifier: ClassifierService,
    store: Arc<dyn PlantStore>,
    photo: PhotoSettings,
) {
    for path in &args.images {
        let workflow = IdentificationWorkflow::new(classifier.clone(), Arc::clone(&store), photo);

        // Files stand in for the platform picker
        let (request, completion) = request_image(ImageSource::Library);
        match read_image_file(path) {
            Ok(bytes) => completion.select(bytes),
            Err(e) => {
                log::warn!("{}: {}", path.display(), e);
                completion.cancel();
            }
        }
        if !workflow.apply_picker_event(request.outcome().await) {
            println!("{}: skipped", path.display());
            continue;
        }

        match workflow.identify().await {
            Ok(SessionState::Classified { label }) => println!("{}: {}", path.display(), label),
            Ok(SessionState::ClassificationFailed { reason }) => {
                println!(
                    "{}: {}",
                    path.display(),
                    classification_failure_message(reason)
                );
                continue;
            }
            Ok(other) => {
                log::warn!("Unexpected state after classification: {}", other.name());
                continue;
            }
            Err(e) => {
                log::error!("{}", e);
                continue;
            }
        }

        if args.save {
            match workflow.save().await {
                Ok(plant) => println!("  saved as {} ({})", plant.title(), plant.id),
                Err(e) => eprintln!("  {}", e.user_message()),
            }
        }
    }
}

fn print_garden(store: &dyn PlantStore, json: bool) -> Result<(), AppError> {
    let plants = store.list()?;
    if json {
        let out = serde_json::to_string_pretty(&plants)
            .map_err(|e| AppError::Storage(format!("Failed to serialize garden: {}", e)))?;
        println!("{}", out);
        return Ok(());
    }

    if plants.is_empty() {
        println!("Your garden is empty.");
        return Ok(());
    }

    for plant in plants {
        println!(
            "{}  {}  {}  {}",
            plant.id,
            plant.created_at.format("%Y-%m-%d %H:%M"),
            plant.title(),
            if plant.photo.is_some() { "photo" } else { "-" }
        );
    }
    Ok(())
}
