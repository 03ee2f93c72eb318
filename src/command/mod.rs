use clap::Subcommand;

pub mod demux;

pub use demux::DemuxCMD;

///////////////////////////////
/// Possible subcommands to parse
#[derive(Subcommand)]
pub enum Commands {
    /// Demultiplex barcoded reads and clip the barcodes off
    Demux(DemuxCMD),
}
