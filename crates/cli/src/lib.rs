use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use labelsnap_detect::{DetectError, DetectionResponse, GeminiDetector, LabelDetector};
use labelsnap_export::{crop_to_png, export_all, export_page, ProgressSink, ZipArtifact};
use labelsnap_model::{CropRegion, DocumentMeta, ExportProgress};
use labelsnap_raster::{default_backend, OpenSource, PixelRaster, RasterBackend, RENDER_SCALE};
use labelsnap_storage::PresetStore;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use viewer_core::{RenderRequest, Session};

#[derive(Debug, Parser)]
#[command(name = "labelsnap")]
#[command(about = "Crop shipping labels out of multi-page PDF documents")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Crop one page to a PNG.
    Crop {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, value_parser = parse_region, conflicts_with = "preset")]
        region: Option<CropRegion>,
        /// Index into the saved presets, newest last.
        #[arg(long)]
        preset: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        store_root: Option<PathBuf>,
    },
    /// Crop every page and package the results into a zip archive.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_parser = parse_region, conflicts_with = "preset")]
        region: Option<CropRegion>,
        #[arg(long)]
        preset: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        store_root: Option<PathBuf>,
    },
    /// Manage saved crop presets.
    Preset {
        #[arg(long)]
        store_root: Option<PathBuf>,
        #[command(subcommand)]
        command: PresetCommands,
    },
    /// Ask the label-detection service for a crop suggestion on one page.
    Detect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Also write the cropped PNG when a label is found.
        #[arg(long)]
        apply_crop: bool,
        #[arg(long, requires = "apply_crop")]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum PresetCommands {
    /// Print saved presets as JSON.
    List,
    /// Save a new preset.
    Add {
        #[arg(long, value_parser = parse_region)]
        region: CropRegion,
    },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Crop { file, page, region, preset, output, store_root } => {
            ensure_pdf_exists(&file)?;
            let region = resolve_region(region, preset, store_root.as_deref())?;
            let output = crop_page_to_file(&file, page, region, output.as_deref())?;
            println!("{}", output.display());
            Ok(())
        }
        Commands::Export { file, region, preset, output, store_root } => {
            run_export(file, region, preset, output, store_root).await
        }
        Commands::Preset { store_root, command } => run_preset(store_root.as_deref(), command),
        Commands::Detect { file, page, apply_crop, output } => {
            run_detect(file, page, apply_crop, output).await
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut backend = default_backend()?;
    let handle = backend.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = backend.page_count(handle)?;
    let first_page_size_pt = if page_count > 0 {
        let size = backend.page_size(handle, 1)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };

    let payload = InfoOutput { path: file.display().to_string(), page_count, first_page_size_pt };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    backend.close(handle)?;

    Ok(())
}

/// Stderr progress line per page, stdout stays machine-readable.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn update(&mut self, progress: ExportProgress) {
        if progress.current == 0 {
            eprintln!("exporting {} pages", progress.total);
        } else {
            eprintln!("page {}/{}", progress.current, progress.total);
        }
    }

    fn clear(&mut self) {}
}

async fn run_export(
    file: PathBuf,
    region: Option<CropRegion>,
    preset: Option<usize>,
    output: Option<PathBuf>,
    store_root: Option<PathBuf>,
) -> Result<()> {
    ensure_pdf_exists(&file)?;
    let region = resolve_region(region, preset, store_root.as_deref())?;

    // Rendering every page is CPU-bound; keep it off the async runtime.
    let task_file = file.clone();
    let artifact = tokio::task::spawn_blocking(move || -> Result<ZipArtifact> {
        let mut backend = default_backend()?;
        let handle =
            backend.open(OpenSource::from(task_file.as_path())).context("failed to open PDF")?;

        let page_count = backend.page_count(handle)?;
        let meta = DocumentMeta::new(document_name(&task_file), page_count);

        let artifact = export_all(&backend, handle, &meta, &region, &mut StderrProgress)
            .context("batch export failed")?;
        backend.close(handle)?;

        Ok(artifact)
    })
    .await
    .context("export task panicked")??;

    let output =
        output.unwrap_or_else(|| file.with_file_name(&artifact.file_name));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, &artifact.bytes)
        .with_context(|| format!("failed to write archive to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_preset(store_root: Option<&Path>, command: PresetCommands) -> Result<()> {
    let store = open_store(store_root)?;

    match command {
        PresetCommands::List => {
            let presets = store.load_all();
            println!("{}", serde_json::to_string_pretty(&presets)?);
        }
        PresetCommands::Add { region } => {
            let index = store.append(region).context("failed to save preset")?;
            println!("saved preset {index}");
        }
    }

    Ok(())
}

async fn run_detect(
    file: PathBuf,
    page: u32,
    apply_crop: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    ensure_pdf_exists(&file)?;

    let task_file = file.clone();
    let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let mut backend = default_backend()?;
        let handle =
            backend.open(OpenSource::from(task_file.as_path())).context("failed to open PDF")?;

        let page_count = backend.page_count(handle)?;
        if page == 0 || page > page_count {
            anyhow::bail!("page {page} is out of range (document has {page_count} pages)");
        }

        let mut raster = PixelRaster::new();
        backend.render_into(handle, page, RENDER_SCALE, &mut raster)?;
        // The detector sees the whole page, so crop with the full-page region.
        let png = crop_to_png(&raster, &CropRegion::clamped(0.0, 0.0, 100.0, 100.0))?;
        backend.close(handle)?;

        Ok(png)
    })
    .await
    .context("render task panicked")??;

    let detector = detector_from_env()?;
    match labelsnap_detect::suggest(detector.as_ref(), &png).await {
        Some(region) => {
            println!("{}", serde_json::to_string_pretty(&region)?);

            if apply_crop {
                let written = crop_page_to_file(&file, page, region, output.as_deref())?;
                println!("{}", written.display());
            }
        }
        None => println!("no label found"),
    }

    Ok(())
}

/// Detector substituted from `LABELSNAP_DETECT_STUB`: the variable holds the
/// JSON detection response verbatim, so tests never leave the machine.
struct EnvStubDetector {
    json: String,
}

#[async_trait]
impl LabelDetector for EnvStubDetector {
    async fn detect(&self, _image_png: &[u8]) -> Result<DetectionResponse, DetectError> {
        serde_json::from_str(&self.json).map_err(|err| DetectError::Schema(err.to_string()))
    }
}

fn detector_from_env() -> Result<Box<dyn LabelDetector>> {
    if let Ok(json) = std::env::var("LABELSNAP_DETECT_STUB") {
        return Ok(Box::new(EnvStubDetector { json }));
    }

    let api_key =
        std::env::var("LABELSNAP_API_KEY").context("LABELSNAP_API_KEY is not set")?;
    Ok(Box::new(GeminiDetector::new(api_key)))
}

fn crop_page_to_file(
    file: &Path,
    page: u32,
    region: CropRegion,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let mut backend = default_backend()?;
    let handle = backend.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = backend.page_count(handle)?;
    let mut session = Session::open(DocumentMeta::new(document_name(file), page_count));
    session.set_region(region);

    let request = request_for_page(&mut session, page)?;
    let encoded = export_page(&backend, handle, request.page, &session.region)
        .with_context(|| format!("failed to crop page {page}"))?;
    session.navigator.finish_render();

    backend.close(handle)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.with_file_name(&encoded.file_name));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, &encoded.bytes)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    Ok(output)
}

fn request_for_page(session: &mut Session, page: u32) -> Result<RenderRequest> {
    if page == session.navigator.current_page() {
        return Ok(session.navigator.initial_render());
    }

    session.navigator.jump_to(page).with_context(|| {
        format!(
            "page {page} is out of range (document has {} pages)",
            session.navigator.page_count()
        )
    })
}

fn resolve_region(
    region: Option<CropRegion>,
    preset: Option<usize>,
    store_root: Option<&Path>,
) -> Result<CropRegion> {
    if let Some(region) = region {
        return Ok(region);
    }

    if let Some(index) = preset {
        let store = open_store(store_root)?;
        let presets = store.load_all();
        tracing::debug!(index, available = presets.len(), "resolving preset region");
        return presets
            .get(index)
            .copied()
            .with_context(|| format!("preset {index} not found ({} saved)", presets.len()));
    }

    Ok(CropRegion::default())
}

fn open_store(root: Option<&Path>) -> Result<PresetStore> {
    match root {
        Some(root) => Ok(PresetStore::with_root(root)),
        None => PresetStore::from_default_project().context("could not locate a data directory"),
    }
}

fn parse_region(value: &str) -> Result<CropRegion, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x,y,width,height, got `{value}`"));
    }

    let mut numbers = [0.0f32; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse::<f32>().map_err(|_| format!("invalid number `{part}`"))?;
    }

    Ok(CropRegion::clamped(numbers[0], numbers[1], numbers[2], numbers[3]))
}

fn document_name(path: &Path) -> String {
    path.file_name().and_then(|name| name.to_str()).unwrap_or("document").to_owned()
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
