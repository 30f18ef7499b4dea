use crate::storage::collections::SortKey;
use crate::surfaces::Preset;
use crate::tmdb::TimeWindow;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

/// Browse the movie catalog from the terminal.
#[derive(Parser, Debug)]
#[command(name = "cinefetch", version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = default_tracing_format(), global = true)]
    pub tracing: TracingFormat,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable, one line per event
    Pretty,
    /// One JSON object per event
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[derive(ClapArgs, Debug, Clone, Copy)]
pub struct PageArgs {
    /// How many pages to accumulate
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub pages: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Trending movies
    Trending {
        #[arg(long, value_enum, default_value_t = TimeWindow::Day)]
        window: TimeWindow,
        #[command(flatten)]
        pages: PageArgs,
    },
    /// Popular movies
    Popular(PageArgs),
    /// Top rated movies
    TopRated(PageArgs),
    /// Upcoming releases
    Upcoming(PageArgs),
    /// Movies in theaters now
    NowPlaying(PageArgs),
    /// Search by title
    Search {
        query: String,
        #[command(flatten)]
        pages: PageArgs,
    },
    /// Browse with filters or a preset
    Discover {
        #[arg(long, value_enum)]
        preset: Option<Preset>,
        /// Genre ids, comma separated
        #[arg(long, value_delimiter = ',')]
        genre: Vec<u32>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        min_rating: Option<f64>,
        /// Upstream sort key, e.g. `vote_average.desc`
        #[arg(long)]
        sort: Option<String>,
        #[command(flatten)]
        pages: PageArgs,
    },
    /// Full details for one movie
    Details {
        id: u64,
        /// Also look up where to watch it
        #[arg(long)]
        streaming: bool,
    },
    /// Where to watch one movie
    Streaming { id: u64 },
    /// The genre catalog
    Genres {
        /// Only genres whose name contains this
        #[arg(long)]
        search: Option<String>,
        /// Ignore the stored snapshot
        #[arg(long)]
        refresh: bool,
    },
    /// Saved favorites
    #[command(subcommand)]
    Favorites(CollectionCommand),
    /// Saved watchlist
    #[command(subcommand)]
    Watchlist(CollectionCommand),
    /// Recent searches
    #[command(subcommand)]
    History(HistoryCommand),
    /// Collaborator and storage status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommand {
    List {
        #[arg(long, value_enum, default_value_t = SortKey::DateAdded)]
        sort: SortKey,
        #[arg(long)]
        desc: bool,
    },
    /// Add the movie if absent, remove it if present
    Toggle { id: u64 },
    Remove { id: u64 },
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    List,
    Clear,
    /// Suggestions for partial input
    Suggest { input: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_discover_flags() {
        let args = Args::parse_from([
            "cinefetch",
            "discover",
            "--genre",
            "28,12",
            "--preset",
            "high-rated",
            "--pages",
            "2",
        ]);
        let Command::Discover {
            genre,
            preset,
            pages,
            ..
        } = args.command
        else {
            panic!("expected discover");
        };
        assert_eq!(genre, vec![28, 12]);
        assert_eq!(preset, Some(Preset::HighRated));
        assert_eq!(pages.pages, 2);
    }

    #[test]
    fn collection_subcommands() {
        let args = Args::parse_from(["cinefetch", "--json", "favorites", "toggle", "42"]);
        assert!(args.json);
        assert!(matches!(
            args.command,
            Command::Favorites(CollectionCommand::Toggle { id: 42 })
        ));
    }

    #[test]
    fn page_count_is_bounded() {
        assert!(Args::try_parse_from(["cinefetch", "popular", "--pages", "21"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
