//! Output sinks: the time-series summary and the end-of-run dumps
//!
//! Summary rows are appended through a pre-opened buffered stream so a
//! step never blocks on file creation. A write failure is retried once and
//! then the writer degrades permanently to console echoing; the simulation
//! itself continues.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::error::Result;
use crate::core::types::{SimTime, STDOUT_OUTPUT_RATE};
use crate::network::graph::Network;

/// A header row is repeated after this many data rows.
pub const SUMMARY_HEADER_EVERY: usize = 500;

const HEADER: &str = "#time\tagents\tfollows\ttweets\tretweets\n";

#[derive(Debug)]
pub struct SummaryWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    echo_stdout: bool,
    rows: usize,
}

impl SummaryWriter {
    pub fn create(path: &Path, echo_stdout: bool) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Some(BufWriter::new(file)),
            echo_stdout,
            rows: 0,
        })
    }

    pub fn write_row(
        &mut self,
        time: SimTime,
        n_agents: usize,
        n_follows: u64,
        n_tweets: u64,
        n_retweets: u64,
    ) {
        let mut line = String::new();
        if self.rows % SUMMARY_HEADER_EVERY == 0 {
            line.push_str(HEADER);
        }
        line.push_str(&format!(
            "{time:.2}\t{n_agents}\t{n_follows}\t{n_tweets}\t{n_retweets}\n"
        ));
        self.rows += 1;

        if let Some(out) = self.out.as_mut() {
            if out.write_all(line.as_bytes()).is_err() {
                // One retry, then downgrade to console for the rest of the
                // run.
                if out.write_all(line.as_bytes()).is_err() {
                    tracing::warn!(
                        path = %self.path.display(),
                        "summary stream failed twice, falling back to console"
                    );
                    self.out = None;
                }
            }
        }
        if self.out.is_none() || (self.echo_stdout && (self.rows - 1) % STDOUT_OUTPUT_RATE == 0) {
            print!("{line}");
        }
    }

    pub fn finish(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(err) = out.flush() {
                tracing::warn!(%err, "failed to flush summary stream");
            }
        }
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Edge-list dump of the final follow graph, one `follower<TAB>followee`
/// pair per line.
pub fn dump_graph(net: &Network, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "#follower\tfollowee")?;
    for idx in 0..net.len() {
        for target in &net.agents.follow_sets[idx] {
            writeln!(out, "{idx}\t{}", target.0)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Per-agent statistics dump.
pub fn dump_agent_stats(net: &Network, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "#agent\ttype\tcreated\tfollowing\tfollowers\ttweets\tretweets")?;
    for idx in 0..net.len() {
        let id = crate::core::types::AgentId::from_index(idx);
        writeln!(
            out,
            "{idx}\t{}\t{:.2}\t{}\t{}\t{}\t{}",
            net.agents.types[idx],
            net.agents.creation_times[idx],
            net.agents.follow_sets[idx].len(),
            net.n_followers(id),
            net.agents.tweet_counts[idx],
            net.agents.retweet_counts[idx],
        )?;
    }
    out.flush()?;
    Ok(())
}
