mod download;
mod extract_inline;
mod extract_urls;
mod inspect;
mod normalize;

use clap::Subcommand;
pub use download::*;
pub use extract_inline::*;
pub use extract_urls::*;
pub use inspect::*;
pub use normalize::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read an HTML document and print the absolute URLs of its images as a
    /// JSON array, leaving out images shorter than the configured minimum
    /// height.
    ExtractUrls(ExtractUrlsOptions),

    /// Download images into a directory. Failed downloads are reported and
    /// the rest of the batch carries on.
    Download(DownloadOptions),

    /// Scale every image in a directory to the target width and re-encode it
    /// in the target format, replacing the original.
    Normalize(NormalizeOptions),

    /// Print the dimensions and file size of every image in a directory.
    Inspect(InspectOptions),

    /// Save the base64 images embedded in an HTML document as files.
    ExtractInline(ExtractInlineOptions),
}
