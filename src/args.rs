use clap::{Parser, Subcommand};

/// This is a dashboard for survey form submissions exported to Excel.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file or directory path) The data to load. A directory is scanned for all its .xlsx files,
    /// unless --source folder is given. Setting this option overrides the path that may be specified
    /// with the --config option.
    #[clap(short, long, value_parser, global = true)]
    pub input: Option<String>,

    /// (file, folder or glob) How to read the input. 'folder' reads the file given by --file-name
    /// inside the input directory, 'glob' merges all the .xlsx files of the directory.
    #[clap(long, value_parser, global = true)]
    pub source: Option<String>,

    /// (default EFSP_Dashboard_Data.xlsx) The name of the workbook to read with --source folder.
    #[clap(long, value_parser, global = true)]
    pub file_name: Option<String>,

    /// (file path, optional) A JSON file describing the data source, the notes file and the output
    /// directory. For more information about the file format, read the documentation of survey_view::manual
    #[clap(short, long, value_parser, global = true)]
    pub config: Option<String>,

    /// (file path, default surveyor_notes.csv) The CSV file that receives the notes.
    #[clap(long, value_parser, global = true)]
    pub notes: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// The selections that narrow down the submissions.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// (name or 'all') Only the submissions of this surveyor.
    #[clap(long, value_parser)]
    pub surveyor: Option<String>,

    /// (YYYY-MM-DD) First day of the submission date range (inclusive).
    #[clap(long, value_parser)]
    pub from: Option<String>,

    /// (YYYY-MM-DD) Last day of the submission date range (inclusive).
    #[clap(long, value_parser)]
    pub to: Option<String>,

    #[clap(long, value_parser)]
    pub province: Option<String>,

    #[clap(long, value_parser)]
    pub district: Option<String>,

    #[clap(long, value_parser)]
    pub village: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Writes the dashboard to an HTML page.
    Render {
        #[clap(flatten)]
        filters: FilterArgs,
        /// (cluster, sequence or route) The presentation of the map. The route requires --surveyor.
        #[clap(long, value_parser)]
        map_mode: Option<String>,
        /// (file path, default dashboard.html in the output directory)
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// (submission KEY) Adds the details of this submission to the page, with previews of
        /// its photos and recordings.
        #[clap(short, long, value_parser)]
        key: Option<String>,
    },
    /// Prints the metrics and chart series in JSON format.
    Summary {
        #[clap(flatten)]
        filters: FilterArgs,
        /// (file path) A reference summary in JSON format. If provided, surveydash will
        /// check that the computed summary matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
    /// Shows all the fields of a submission.
    Record {
        #[clap(flatten)]
        filters: FilterArgs,
        #[clap(short, long, value_parser)]
        key: String,
    },
    /// Lists the identifiers of the selected submissions.
    Keys {
        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Lists the choices offered by each filter.
    Options {
        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Writes the selected submissions to a CSV file.
    Export {
        #[clap(flatten)]
        filters: FilterArgs,
        /// (file path or 'stdout', default stdout)
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Appends a note about a surveyor to the notes file.
    Note {
        #[clap(short, long, value_parser)]
        surveyor: String,
        #[clap(short, long, value_parser)]
        text: String,
    },
    /// Reads commands from the standard input, keeping the data loaded between commands.
    Session,
}
