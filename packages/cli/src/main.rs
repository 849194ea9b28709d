#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `pip`: resolve the parents of geospatial records by point-in-polygon.
//!
//! ```text
//! pip update --spatial-source /data/admin --writer-uri fs:///data/out /data/venues
//! pip query --spatial-source /data/admin --latitude 37.77 --longitude -122.41
//! pip query --spatial-source /data/admin --mode server --server-uri http://localhost:8080
//! pip ancestors venue --role common
//! ```
//!
//! Logging goes through `pretty_env_logger` (set `RUST_LOG=info` or
//! `RUST_LOG=debug`) and is routed around the progress bar.

mod progress;
mod query;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pip_models::{Existential, SprFilter};
use pip_placetypes::{DEFAULT_ROLES, Role};
use pip_resolver::SelectionStrategy;
use pip_update::{UpdateApplication, UpdateOptions};

use crate::progress::{RecordsBar, init_logger};
use crate::query::{PointInPolygonRequest, SortOrder};

#[derive(Parser)]
#[command(name = "pip", about = "Point-in-polygon parent resolution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and write the parents of target records
    Update {
        /// TOML options file; flags given on the command line override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// File or directory of candidate parent records (repeatable)
        #[arg(long = "spatial-source")]
        spatial_sources: Vec<PathBuf>,
        /// Mapshaper server used to compute polygon centroids
        #[arg(long)]
        mapshaper_server: Option<String>,
        /// Output destination (`null://`, `fs:///dir`,
        /// `featurecollection://stdout`, `featurecollection:///file.geojson`)
        #[arg(long)]
        writer_uri: Option<String>,
        #[command(flatten)]
        flags: FlagFilters,
        /// How to choose among several candidate parents (`first`, `exactly-one`)
        #[arg(long)]
        selection: Option<SelectionStrategy>,
        /// Only consider parents with these roles (repeatable)
        #[arg(long)]
        role: Vec<Role>,
        /// Records resolved concurrently
        #[arg(long)]
        concurrency: Option<usize>,
        /// Give up on a record after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Supersede records whose parent changed instead of updating them
        #[arg(long)]
        supersede: bool,
        /// Stop at the first failed record
        #[arg(long)]
        fail_fast: bool,
        /// Mint new ids sequentially from this value
        #[arg(long)]
        id_seed: Option<i64>,
        /// Target record files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the boundaries containing a point as JSON, or serve such
    /// queries over HTTP
    Query {
        /// File or directory of candidate records (repeatable)
        #[arg(long = "spatial-source", required = true)]
        spatial_sources: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = QueryMode::Cli)]
        mode: QueryMode,
        /// Address to listen on in server mode
        #[arg(long, default_value = "http://localhost:8080")]
        server_uri: String,
        /// Latitude of the point, in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<f64>,
        /// Longitude of the point, in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<f64>,
        /// Only return these placetypes (repeatable)
        #[arg(long)]
        placetype: Vec<String>,
        #[command(flatten)]
        flags: FlagFilters,
        /// Record properties to add to each result (repeatable; `wof:*`
        /// matches a prefix)
        #[arg(long)]
        property: Vec<String>,
        /// Result order; by default smallest boundary first
        #[arg(long, value_enum)]
        sort: Option<SortOrder>,
    },
    /// List the candidate parent placetypes of a placetype, most specific first
    Ancestors {
        /// Placetype name (e.g. `venue`)
        placetype: String,
        /// Only include these roles (repeatable; default common, optional,
        /// `common_optional`)
        #[arg(long)]
        role: Vec<Role>,
    },
    /// List every known placetype
    Placetypes,
}

/// Currency flag constraints. Each accepts -1, 0 or 1 and may be repeated.
#[derive(Args)]
struct FlagFilters {
    #[arg(long, allow_hyphen_values = true)]
    is_current: Vec<Existential>,
    #[arg(long, allow_hyphen_values = true)]
    is_ceased: Vec<Existential>,
    #[arg(long, allow_hyphen_values = true)]
    is_deprecated: Vec<Existential>,
    #[arg(long, allow_hyphen_values = true)]
    is_superseded: Vec<Existential>,
    #[arg(long, allow_hyphen_values = true)]
    is_superseding: Vec<Existential>,
}

impl FlagFilters {
    fn is_empty(&self) -> bool {
        self.is_current.is_empty()
            && self.is_ceased.is_empty()
            && self.is_deprecated.is_empty()
            && self.is_superseded.is_empty()
            && self.is_superseding.is_empty()
    }

    fn into_filter(self) -> SprFilter {
        SprFilter {
            is_current: self.is_current,
            is_ceased: self.is_ceased,
            is_deprecated: self.is_deprecated,
            is_superseded: self.is_superseded,
            is_superseding: self.is_superseding,
            ..SprFilter::default()
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryMode {
    /// Answer one query and exit
    Cli,
    /// Answer POSTed JSON queries until stopped
    Server,
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Update {
            config,
            spatial_sources,
            mapshaper_server,
            writer_uri,
            flags,
            selection,
            role,
            concurrency,
            timeout_secs,
            supersede,
            fail_fast,
            id_seed,
            paths,
        } => {
            let mut options = match config {
                Some(path) => UpdateOptions::load(&path)?,
                None => UpdateOptions::default(),
            };

            options.spatial_sources.extend(spatial_sources);
            if !flags.is_empty() {
                options.filter = flags.into_filter();
            }
            if mapshaper_server.is_some() {
                options.mapshaper_server = mapshaper_server;
            }
            if let Some(uri) = writer_uri {
                options.writer_uri = uri;
            }
            if let Some(selection) = selection {
                options.selection = selection;
            }
            if !role.is_empty() {
                options.roles = role;
            }
            if let Some(concurrency) = concurrency {
                options.concurrency = concurrency;
            }
            if timeout_secs.is_some() {
                options.timeout_secs = timeout_secs;
            }
            if id_seed.is_some() {
                options.id_seed = id_seed;
            }
            options.supersede |= supersede;
            options.fail_fast |= fail_fast;

            let progress = RecordsBar::start(&multi);
            let summary = UpdateApplication::new(options)
                .with_progress(progress)
                .run(&paths)
                .await?;

            if summary.failed > 0 {
                return Err(format!("{} record(s) failed", summary.failed).into());
            }
        }
        Commands::Query {
            spatial_sources,
            mode,
            server_uri,
            latitude,
            longitude,
            placetype,
            flags,
            property,
            sort,
        } => {
            let index = pip_update::iterate::build_index(&spatial_sources).await?;

            if mode == QueryMode::Server {
                let (host, port) = server::parse_server_uri(&server_uri)?;
                server::serve(Arc::new(index), host, port).await?;
                return Ok(());
            }

            let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
                return Err("--latitude and --longitude are required in cli mode".into());
            };

            let mut filter = flags.into_filter();
            filter.placetypes.extend(placetype);

            let request = PointInPolygonRequest {
                latitude,
                longitude,
                filter,
                properties: property,
                sort,
            };
            let results = query::query(&index, &request).await?;

            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Ancestors { placetype, role } => {
            let roles = if role.is_empty() {
                DEFAULT_ROLES.to_vec()
            } else {
                role
            };

            let taxonomy = pip_placetypes::taxonomy();
            for ancestor in taxonomy.ancestors_for_roles(&placetype, &roles)? {
                println!("{:<16} {}", ancestor.name(), ancestor.role());
            }
        }
        Commands::Placetypes => {
            let taxonomy = pip_placetypes::taxonomy();
            println!("{:<16} {:<16} PARENTS", "NAME", "ROLE");
            println!("{}", "-".repeat(60));
            for pt in taxonomy.all() {
                let parents: Vec<&str> = pt
                    .parents()
                    .iter()
                    .filter_map(|id| taxonomy.get_by_id(*id))
                    .map(pip_placetypes::Placetype::name)
                    .collect();
                println!(
                    "{:<16} {:<16} {}",
                    pt.name(),
                    pt.role().to_string(),
                    parents.join(", ")
                );
            }
        }
    }

    Ok(())
}
