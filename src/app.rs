//! Application wiring: configuration becomes collaborators and surfaces, and
//! one CLI command runs against them.

use crate::cli::{CollectionCommand, Command, HistoryCommand, PageArgs};
use crate::config::Config;
use crate::fetch::Outcome;
use crate::state::{AppState, ServiceStatus};
use crate::storage::collections::Membership;
use crate::storage::history::MIN_QUERY_LEN;
use crate::storage::{Collection, FileBackend, LocalStore};
use crate::streaming::{StreamingBundle, StreamingOption, WatchmodeClient};
use crate::surfaces::{ListState, MovieView, SearchOptions};
use crate::tmdb::{ApiError, DiscoverFilters, ListEndpoint, MoviePage, MovieSummary, TmdbClient};
use crate::utils::{fmt_count, fmt_duration, truncate};
use anyhow::{Context, bail};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use yansi::Paint;

const OVERVIEW_WIDTH: usize = 280;

pub struct App {
    state: AppState,
}

impl App {
    /// Build the collaborators from `config`. A storage directory that cannot
    /// be opened degrades to in-memory state rather than failing startup.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let start = Instant::now();

        let catalog = TmdbClient::new(
            config.tmdb_base_url.as_str(),
            config.tmdb_api_key.clone(),
            config.request_timeout,
        )
        .context("Failed to build catalog client")?
        .with_rate_limit(config.rate_limit_per_second);
        let availability = WatchmodeClient::new(
            config.watchmode_base_url.as_str(),
            config.watchmode_api_key.clone(),
            config.request_timeout,
        )
        .context("Failed to build streaming client")?;

        let (store, storage_status) = match FileBackend::open(config.storage_dir.clone()) {
            Ok(backend) => (LocalStore::new(backend), ServiceStatus::Active),
            Err(e) => {
                warn!(
                    dir = %config.storage_dir.display(),
                    error = %e,
                    "storage directory unavailable, keeping state in memory"
                );
                (LocalStore::memory(), ServiceStatus::Error)
            }
        };

        let state = AppState::new(
            Arc::new(catalog),
            Arc::new(availability),
            store,
            config.tmdb_image_base_url.clone(),
        );

        let statuses = &state.service_statuses;
        if config.has_catalog_key() {
            statuses.set("catalog", ServiceStatus::Active);
        } else {
            warn!("TMDB_API_KEY is not set, catalog requests will fail");
            statuses.set("catalog", ServiceStatus::Disabled);
        }
        statuses.set(
            "streaming",
            if config.has_streaming_key() {
                ServiceStatus::Active
            } else {
                ServiceStatus::Simulated
            },
        );
        statuses.set("storage", storage_status);

        info!(
            config = ?config,
            duration = fmt_duration(start.elapsed()),
            "application initialized"
        );
        Ok(Self { state })
    }

    /// Wrap an existing state, for callers that inject their own collaborators.
    pub fn with_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run one command, printing its result to stdout.
    pub async fn run(&self, command: Command, json: bool) -> anyhow::Result<()> {
        debug!(?command, "running command");
        match command {
            Command::Trending { window, pages } => {
                self.listing(ListEndpoint::Trending { window }, pages, json)
                    .await
            }
            Command::Popular(pages) => self.listing(ListEndpoint::Popular, pages, json).await,
            Command::TopRated(pages) => self.listing(ListEndpoint::TopRated, pages, json).await,
            Command::Upcoming(pages) => self.listing(ListEndpoint::Upcoming, pages, json).await,
            Command::NowPlaying(pages) => {
                self.listing(ListEndpoint::NowPlaying, pages, json).await
            }
            Command::Search { query, pages } => self.search(&query, pages, json).await,
            Command::Discover {
                preset,
                genre,
                year,
                min_rating,
                sort,
                pages,
            } => {
                let mut filters = preset
                    .map(|p| p.filters(Utc::now().date_naive()))
                    .unwrap_or_default();
                if !genre.is_empty() {
                    filters.with_genres = genre;
                }
                if year.is_some() {
                    filters.primary_release_year = year;
                }
                if min_rating.is_some() {
                    filters.vote_average_gte = min_rating;
                }
                if let Some(sort) = sort {
                    filters.sort_by = sort;
                }
                let heading = preset.map_or("Discover", |p| p.label());
                self.discover(heading, filters, pages, json).await
            }
            Command::Details { id, streaming } => self.details(id, streaming, json).await,
            Command::Streaming { id } => {
                let movie = self.movie(id).await?;
                let bundle = self.availability(&movie.detail.summary()).await?;
                if json {
                    return print_json(&bundle);
                }
                println!("{}", movie.detail.title.bold());
                print_bundle(&bundle);
                Ok(())
            }
            Command::Genres { search, refresh } => self.genres(search.as_deref(), refresh, json).await,
            Command::Favorites(cmd) => {
                self.collection("favorites", self.state.favorites(), cmd, json)
                    .await
            }
            Command::Watchlist(cmd) => {
                self.collection("watchlist", self.state.watchlist(), cmd, json)
                    .await
            }
            Command::History(cmd) => self.history(cmd, json),
            Command::Status => self.status(json),
        }
    }

    async fn listing(&self, endpoint: ListEndpoint, pages: PageArgs, json: bool) -> anyhow::Result<()> {
        let listing = self.state.listing(endpoint);
        settle(listing.load().await)?;
        more_pages(pages.pages, || listing.state(), async || listing.load_more().await).await?;
        print_list(&endpoint.to_string(), &listing.state(), json)
    }

    async fn discover(
        &self,
        heading: &str,
        filters: DiscoverFilters,
        pages: PageArgs,
        json: bool,
    ) -> anyhow::Result<()> {
        let discovery = self.state.discovery(filters);
        settle(discovery.discover().await)?;
        more_pages(pages.pages, || discovery.state(), async || discovery.load_more().await).await?;
        let heading = match discovery.filter_count() {
            0 => heading.to_owned(),
            n => format!("{heading} ({n} filters)"),
        };
        print_list(&heading, &discovery.state(), json)
    }

    async fn search(&self, query: &str, pages: PageArgs, json: bool) -> anyhow::Result<()> {
        let query = query.trim();
        anyhow::ensure!(
            query.chars().count() >= MIN_QUERY_LEN,
            "Search query must be at least {MIN_QUERY_LEN} characters"
        );

        let session = self.state.search(SearchOptions::default());
        let mut updates = session.subscribe();
        session.search_now(query);
        let first = updates
            .wait_for(|s| !s.loading && (s.page > 0 || s.error.is_some()))
            .await
            .context("Search session stopped before settling")?
            .clone();
        if let Some(err) = first.error {
            bail!("{}", err.message);
        }
        more_pages(pages.pages, || session.state(), async || session.load_more().await).await?;

        print_list(&format!("Search: {query}"), &session.state(), json)?;
        let metrics = session.metrics();
        if metrics.total_searches > 0 && !json {
            println!(
                "{}",
                format!("fetched in {}", fmt_duration(metrics.last_response_time)).dim()
            );
        }
        Ok(())
    }

    async fn movie(&self, id: u64) -> anyhow::Result<MovieView> {
        let details = self.state.details();
        settle(details.load(id).await)?;
        details
            .state()
            .movie
            .context("Movie details were not published")
    }

    async fn availability(&self, movie: &MovieSummary) -> anyhow::Result<StreamingBundle> {
        settle(self.state.streaming().load(movie).await)
    }

    async fn details(&self, id: u64, with_streaming: bool, json: bool) -> anyhow::Result<()> {
        let view = self.movie(id).await?;
        let streaming = if with_streaming {
            Some(self.availability(&view.detail.summary()).await?)
        } else {
            None
        };
        let membership = Membership::of(id, &self.state.favorites(), &self.state.watchlist());

        if json {
            #[derive(Serialize)]
            struct DetailOutput<'a> {
                movie: &'a MovieView,
                membership: Membership,
                streaming: Option<&'a StreamingBundle>,
            }
            return print_json(&DetailOutput {
                movie: &view,
                membership,
                streaming: streaming.as_ref(),
            });
        }

        print_view(&view, membership);
        if let Some(bundle) = &streaming {
            println!();
            print_bundle(bundle);
        }
        Ok(())
    }

    async fn genres(&self, search: Option<&str>, refresh: bool, json: bool) -> anyhow::Result<()> {
        let genres = self.state.genres();
        let outcome = if refresh {
            genres.refresh().await
        } else {
            genres.load().await
        };
        settle(outcome)?;

        let list = match search {
            Some(query) => genres.search(query),
            None => genres.genres(),
        };
        if json {
            return print_json(&list);
        }
        for genre in &list {
            println!("{:>6}  {}  {}", genre.id.dim(), genre.name.bold(), genre.color.dim());
        }
        if list.is_empty() {
            println!("{}", "No genres found.".dim());
        }
        Ok(())
    }

    async fn collection(
        &self,
        name: &str,
        collection: Collection,
        command: CollectionCommand,
        json: bool,
    ) -> anyhow::Result<()> {
        match command {
            CollectionCommand::List { sort, desc } => {
                let items = collection.sorted(sort, desc);
                if json {
                    return print_json(&items);
                }
                if items.is_empty() {
                    println!("{}", format!("No movies in {name}.").dim());
                    return Ok(());
                }
                for (index, saved) in items.iter().enumerate() {
                    println!("{}", movie_line(index, &saved.movie));
                }
                if let Some(average) = collection.average_rating() {
                    println!(
                        "{}",
                        format!("{} movies, average rating {average:.1}", items.len()).dim()
                    );
                }
                Ok(())
            }
            CollectionCommand::Toggle { id } => {
                // A saved entry already carries the summary, so removal needs no request.
                let movie = match collection.items().into_iter().find(|m| m.movie.id == id) {
                    Some(saved) => saved.movie,
                    None => self.movie(id).await?.detail.summary(),
                };
                let now_present = collection.toggle(&movie);
                if json {
                    return print_json(&serde_json::json!({
                        "id": id,
                        "collection": name,
                        "present": now_present,
                    }));
                }
                let verb = if now_present { "Added" } else { "Removed" };
                let preposition = if now_present { "to" } else { "from" };
                println!("{verb} {} {preposition} {name}", movie.title.bold());
                Ok(())
            }
            CollectionCommand::Remove { id } => {
                let removed = collection.remove(id);
                if json {
                    return print_json(&serde_json::json!({ "id": id, "removed": removed }));
                }
                if removed {
                    println!("Removed #{id} from {name}");
                } else {
                    println!("{}", format!("#{id} is not in {name}").dim());
                }
                Ok(())
            }
            CollectionCommand::Clear => {
                let cleared = collection.clear();
                if json {
                    return print_json(&serde_json::json!({ "cleared": cleared }));
                }
                if !cleared {
                    bail!("Failed to clear {name}");
                }
                println!("Cleared {name}");
                Ok(())
            }
        }
    }

    fn history(&self, command: HistoryCommand, json: bool) -> anyhow::Result<()> {
        let history = self.state.history();
        match command {
            HistoryCommand::List => {
                let entries = history.entries();
                if json {
                    return print_json(&entries);
                }
                for entry in &entries {
                    println!(
                        "{}  {}",
                        entry.query.bold(),
                        format!("{} results", fmt_count(entry.result_count)).dim()
                    );
                }
                if entries.is_empty() {
                    println!("{}", "No recent searches.".dim());
                }
                Ok(())
            }
            HistoryCommand::Clear => {
                let cleared = history.clear();
                if json {
                    return print_json(&serde_json::json!({ "cleared": cleared }));
                }
                if !cleared {
                    bail!("Failed to clear search history");
                }
                println!("Cleared search history");
                Ok(())
            }
            HistoryCommand::Suggest { input } => {
                let suggestions = history.suggestions(&input);
                if json {
                    return print_json(&suggestions);
                }
                for suggestion in &suggestions {
                    let count = suggestion
                        .result_count
                        .map(|n| format!(" ({} results)", fmt_count(n)))
                        .unwrap_or_default();
                    println!("{}{}", suggestion.query, count.dim());
                }
                Ok(())
            }
        }
    }

    fn status(&self, json: bool) -> anyhow::Result<()> {
        let services = self.state.service_statuses.all();
        let store = &self.state.store;

        #[derive(Serialize)]
        struct StatusOutput {
            version: &'static str,
            commit: &'static str,
            services: Vec<(String, ServiceStatus)>,
            storage_available: bool,
            storage_bytes: usize,
            favorites: usize,
            watchlist: usize,
            history: usize,
        }
        let output = StatusOutput {
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("GIT_COMMIT_SHORT"),
            services,
            storage_available: store.is_available(),
            storage_bytes: store.storage_size(),
            favorites: self.state.favorites().len(),
            watchlist: self.state.watchlist().len(),
            history: self.state.history().len(),
        };
        if json {
            return print_json(&output);
        }

        println!(
            "{} {}",
            format!("cinefetch {}", output.version).bold(),
            output.commit.dim()
        );
        for (name, status) in &output.services {
            let label = format!("{status:?}").to_lowercase();
            let label = match status {
                ServiceStatus::Active => label.green(),
                ServiceStatus::Simulated => label.yellow(),
                ServiceStatus::Disabled => label.dim(),
                ServiceStatus::Error => label.red(),
            };
            println!("  {name:<10} {label}");
        }
        println!(
            "  {:<10} {} bytes, {} favorites, {} watchlist, {} searches",
            "stored",
            fmt_count(output.storage_bytes as u64),
            output.favorites,
            output.watchlist,
            output.history
        );
        Ok(())
    }
}

/// Turn a settled outcome into a value, or an error carrying the user-facing message.
fn settle<T>(outcome: Outcome<T>) -> anyhow::Result<T> {
    match outcome {
        Outcome::Fresh(value) | Outcome::Cached(value) => Ok(value),
        Outcome::Failed(err) => Err(failure(err)),
        Outcome::Superseded => bail!("Request was superseded"),
    }
}

fn failure(err: ApiError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

/// Keep loading pages until `target` pages are in or the feed runs out.
async fn more_pages(
    target: u32,
    state: impl Fn() -> ListState,
    mut load_more: impl AsyncFnMut() -> Option<Outcome<MoviePage>>,
) -> anyhow::Result<()> {
    loop {
        let current = state();
        if current.page >= target || !current.has_more {
            return Ok(());
        }
        match load_more().await {
            Some(outcome) => {
                settle(outcome)?;
            }
            None => return Ok(()),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn movie_line(index: usize, movie: &MovieSummary) -> String {
    let year = movie
        .release_year()
        .map(|y| format!(" ({y})"))
        .unwrap_or_default();
    format!(
        "{:>3}. {}{} {} {}",
        index + 1,
        movie.title.bold(),
        year.dim(),
        format!("★ {:.1}", movie.vote_average).yellow(),
        format!("#{}", movie.id).dim()
    )
}

fn print_list(heading: &str, state: &ListState, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(state);
    }
    let cached = if state.from_cache { ", cached" } else { "" };
    println!(
        "{} {}",
        heading.bold().underline(),
        format!(
            "page {} of {}, {} results{cached}",
            state.page,
            state.total_pages,
            fmt_count(state.total_results)
        )
        .dim()
    );
    for (index, movie) in state.items.iter().enumerate() {
        println!("{}", movie_line(index, movie));
    }
    if state.is_empty() {
        println!("{}", "No movies found.".dim());
    }
    if let Some(err) = &state.error {
        println!("{}", err.message.red());
    }
    Ok(())
}

fn print_view(view: &MovieView, membership: Membership) {
    let movie = &view.detail;
    let year = view.year.map(|y| format!(" ({y})")).unwrap_or_default();
    println!("{}{}", movie.title.bold(), year.dim());
    if let Some(tagline) = movie.tagline.as_deref().filter(|t| !t.is_empty()) {
        println!("{}", tagline.italic());
    }

    let mut facts = vec![view.rating_formatted.yellow().to_string()];
    if let Some(runtime) = &view.formatted_runtime {
        facts.push(runtime.clone());
    }
    if let Some(date) = &view.release_date_formatted {
        let label = if view.is_released { "released" } else { "releases" };
        facts.push(format!("{label} {date}"));
    }
    if !movie.genres.is_empty() {
        let names: Vec<&str> = movie.genres.iter().map(|g| g.name.as_str()).collect();
        facts.push(names.join(", "));
    }
    println!("{}", facts.join(" · "));

    if let Some(director) = &view.director {
        println!("{} {}", "Director:".dim(), director.name);
    }
    if !view.main_cast.is_empty() {
        let cast: Vec<&str> = view.main_cast.iter().map(|c| c.name.as_str()).collect();
        println!("{} {}", "Cast:".dim(), cast.join(", "));
    }
    if !movie.overview.is_empty() {
        println!();
        println!("{}", truncate(&movie.overview, OVERVIEW_WIDTH));
    }
    if let Some(url) = view.trailer_url() {
        println!("{} {}", "Trailer:".dim(), url);
    }
    if let Some(url) = &view.poster_url {
        println!("{} {}", "Poster:".dim(), url.dim());
    }
    let mut saved = Vec::new();
    if membership.is_favorite {
        saved.push("favorite");
    }
    if membership.is_in_watchlist {
        saved.push("on watchlist");
    }
    if !saved.is_empty() {
        println!("{}", saved.join(", ").green());
    }
}

fn print_options(title: &str, options: &[StreamingOption]) {
    if options.is_empty() {
        return;
    }
    println!("{}", title.bold());
    for option in options {
        let price = option
            .rent_price()
            .map(|p| format!(" {p}"))
            .unwrap_or_default();
        println!("  {}{}  {}", option.service.name, price.yellow(), option.url.dim());
    }
}

fn print_bundle(bundle: &StreamingBundle) {
    if bundle.is_simulated() {
        println!("{}", "Availability is simulated.".yellow());
    }
    print_options("Subscription", &bundle.subscriptions);
    print_options("Rent or buy", &bundle.rentals);
    print_options("Free", &bundle.free);
    if bundle.is_empty() {
        println!("{}", "Not available on any known service.".dim());
    }
}
