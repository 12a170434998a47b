//! Command line interface for the `meshfrag` simulation binary.
//!
//! The binary pushes one payload between two in-memory nodes so the
//! windowing and reassembly behaviour can be observed from a shell.

use clap::Parser;

/// Command line arguments for the `meshfrag` binary.
#[derive(Debug, Parser)]
#[command(
    name = "meshfrag",
    version,
    about = "Simulate a fragmented transfer between two mesh nodes"
)]
pub struct Cli {
    /// Payload length in bytes.
    #[arg(short, long, default_value_t = 250)]
    pub length: usize,
    /// Bytes carried by each fragment.
    #[arg(short, long, default_value_t = 100)]
    pub fragment_size: usize,
    /// Fragments in flight per window (0 disables fragmentation).
    #[arg(short, long, default_value_t = 2)]
    pub window: u8,
    /// Lose this fragment on the link, failing the transfer.
    #[arg(short, long)]
    pub drop_fragment: Option<u8>,
    /// Per-fragment ack timeout in milliseconds; an incomplete reassembly
    /// is abandoned after three of these.
    #[arg(short, long, default_value_t = 1600)]
    pub ack_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_transfer_options() {
        let cli = Cli::parse_from(["meshfrag", "--length", "120", "-f", "50", "-w", "1", "-d", "1"]);
        assert_eq!(cli.length, 120);
        assert_eq!(cli.fragment_size, 50);
        assert_eq!(cli.window, 1);
        assert_eq!(cli.drop_fragment, Some(1));
    }

    #[test]
    fn defaults_describe_scenario_a() {
        let cli = Cli::parse_from(["meshfrag"]);
        assert_eq!((cli.length, cli.fragment_size, cli.window), (250, 100, 2));
        assert!(cli.drop_fragment.is_none());
        assert_eq!(cli.ack_timeout_ms, 1600);
    }
}
