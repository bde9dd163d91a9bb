use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "server")]
use schemaview::serve::{ServeArgs, run_serve};
use schemaview::config::{SCHEMAS, is_known_schema};
use schemaview::loader::{locate_schema_dir, parse_base};
use schemaview::{
    AppState, Density, SchemaBase, SchemaLoader, UrlState, ViewSettings, export_file_name, render_svg,
    search,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

/// Where schemas come from; shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Schema to open. Defaults to the `schema` query parameter, then Document.
    #[arg(short = 's', long = "schema")]
    pub schema: Option<String>,

    /// Directory holding the `*.schema.json` files.
    #[arg(long = "schema-dir", conflicts_with = "schema_url")]
    pub schema_dir: Option<PathBuf>,

    /// Base URL the `*.schema.json` files are fetched from.
    #[arg(long = "schema-url")]
    pub schema_url: Option<String>,
}

impl SourceArgs {
    pub fn loader(&self) -> Result<SchemaLoader> {
        let base = match (&self.schema_dir, &self.schema_url) {
            (Some(dir), _) => parse_base(&dir.to_string_lossy())?,
            (None, Some(url)) => parse_base(url)?,
            (None, None) => SchemaBase::Directory(locate_schema_dir()?),
        };
        Ok(SchemaLoader::new(base))
    }

    fn resolve_schema(&self, from_query: &str) -> Result<String> {
        match &self.schema {
            Some(name) if is_known_schema(name) => Ok(name.clone()),
            Some(name) => {
                let known: Vec<&str> = SCHEMAS.iter().map(|source| source.name).collect();
                bail!("unknown schema '{name}'; expected one of: {}", known.join(", "))
            }
            None => Ok(from_query.to_string()),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "schemaview render",
    about = "Render the graph view of a schema to SVG or PNG."
)]
pub struct RenderArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// View state as a URL query string, e.g. `depth=2&node=Package`.
    #[arg(long = "query")]
    query: Option<String>,

    /// Expansion depth from the root node.
    #[arg(long = "depth")]
    depth: Option<u32>,

    /// Layout density preset (compact, normal, sparse, airy).
    #[arg(long = "density")]
    density: Option<Density>,

    /// Hide edge labels.
    #[arg(long = "no-labels", action = ArgAction::SetTrue)]
    no_labels: bool,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Background color behind the graph.
    #[arg(short = 'b', long = "background-color", default_value = "white")]
    background_color: String,

    /// Scale factor applied when rasterizing PNG output.
    #[arg(long = "scale", default_value_t = 2.0)]
    scale: f32,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "schemaview search",
    about = "Search entity and property names of a schema."
)]
pub struct SearchArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Text to look for (at least two characters).
    query: String,

    /// Print results as JSON.
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "svg" => Some(OutputFormat::Svg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let rest = || std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned());
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            #[cfg(feature = "server")]
            {
                run_serve(ServeArgs::parse_from(rest())).await
            }
            #[cfg(not(feature = "server"))]
            {
                Err(anyhow!(
                    "'serve' command requires the 'server' feature to be enabled"
                ))
            }
        }
        Some("search") => run_search(SearchArgs::parse_from(rest())).await,
        Some("render") => run_render(RenderArgs::parse_from(rest())).await,
        _ => run_render(RenderArgs::parse_from(args)).await,
    }
}

/// Loads `schema` through the same ticketed path the web view uses and turns
/// a recorded load failure into an error.
async fn load_state(loader: &SchemaLoader, schema: &str, settings: ViewSettings) -> Result<AppState> {
    let mut state = AppState::placeholder(settings);
    let ticket = state.begin_load(schema);
    let result = loader.fetch(schema).await;
    state.finish_load(ticket, result);
    if let Some(failure) = &state.load_error {
        bail!("failed to load schema '{schema}': {}", failure.message);
    }
    Ok(state)
}

async fn run_render(cli: RenderArgs) -> Result<()> {
    let mut url = cli.query.as_deref().map(UrlState::parse).unwrap_or_default();
    if let Some(depth) = cli.depth {
        url.settings.depth = depth;
    }
    if let Some(density) = cli.density {
        url.settings.density = density;
    }
    if cli.no_labels {
        url.settings.labels = false;
    }

    let schema = cli.source.resolve_schema(&url.schema)?;
    let loader = cli.source.loader()?;
    let mut state = load_state(&loader, &schema, url.settings).await?;
    state.apply_url_state(&url);

    let output_dest = parse_output(cli.output.as_deref(), &schema, cli.output_format)?;
    let format = determine_format(cli.output_format, &output_dest)?;

    let svg = render_svg(&state, &cli.background_color)?;
    let output_bytes = match format {
        OutputFormat::Svg => svg.into_bytes(),
        OutputFormat::Png => render_png_bytes(&svg, cli.scale)?,
    };

    tracing::debug!(
        schema = %schema,
        nodes = state.displayed.nodes().len(),
        links = state.displayed.links().len(),
        "rendered view"
    );
    write_output(output_dest, &output_bytes, cli.quiet)
}

#[cfg(feature = "png")]
fn render_png_bytes(svg: &str, scale: f32) -> Result<Vec<u8>> {
    schemaview::render_png(svg, scale)
}

#[cfg(not(feature = "png"))]
fn render_png_bytes(_svg: &str, _scale: f32) -> Result<Vec<u8>> {
    Err(anyhow!("PNG output requires the 'png' feature to be enabled"))
}

async fn run_search(cli: SearchArgs) -> Result<()> {
    let schema = cli.source.resolve_schema(schemaview::DEFAULT_SCHEMA)?;
    let loader = cli.source.loader()?;
    let state = load_state(&loader, &schema, ViewSettings::default()).await?;
    let results = search(&state.model, &cli.query);

    let mut stdout = io::stdout();
    if cli.json {
        serde_json::to_writer_pretty(&mut stdout, &results)?;
        writeln!(stdout)?;
    } else {
        for result in &results {
            writeln!(stdout, "{:<9} {}", result.kind.as_str(), result.name)?;
        }
    }
    stdout.flush()?;
    Ok(())
}

fn parse_output(
    output: Option<&str>,
    schema: &str,
    format_hint: Option<OutputFormat>,
) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => {
            let mut path = PathBuf::from(export_file_name(schema, Utc::now()));
            if let Some(OutputFormat::Png) = format_hint {
                path.set_extension(OutputFormat::Png.extension());
            }
            Ok(OutputDestination::File(path))
        }
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    if let Some(fmt) = preference {
        return Ok(fmt);
    }

    match output {
        OutputDestination::Stdout => Ok(OutputFormat::Svg),
        OutputDestination::File(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unable to determine output format from '{}'; please specify --output-format",
                path.display()
            )
        }),
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Generated schema view -> {}", path.display());
            }
        }
    }
    Ok(())
}
