//! Chromosome naming and ordering.
//!
//! Sorted streams are merged chromosome by chromosome, so every stream must
//! agree on which chromosome comes first. The order is taken from a genome
//! file (tab-delimited `chrom\tsize`) or the query's `##contig` lines when
//! either is available; otherwise the query defines it as it is read.

use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{AnnoError, Result};

/// Strip an optional `chr` prefix so `chr1` and `1` name the same sequence.
#[inline]
pub fn chrom_base(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

/// Chromosome equality ignoring a leading `chr`.
#[inline]
pub fn same_chrom(a: &str, b: &str) -> bool {
    a == b || chrom_base(a) == chrom_base(b)
}

/// Chromosome ranks shared by the query and every source of one run.
///
/// Clones share the same ranks. Chromosomes reached by the query that are
/// not ranked yet are appended in first-seen order, so `1..22,X,Y,MT` and
/// `chrM,chr1,..` are both accepted without a genome file.
#[derive(Debug, Clone, Default)]
pub struct ChromOrder {
    ranks: Arc<RwLock<Genome>>,
}

impl ChromOrder {
    /// An order defined entirely by the query.
    pub fn observed() -> Self {
        Self::default()
    }

    /// Ranks from a genome file, extended by any other query chromosome.
    pub fn from_genome(genome: Genome) -> Self {
        Self {
            ranks: Arc::new(RwLock::new(genome)),
        }
    }

    /// Ranks from a list of names, such as a VCF's `##contig` IDs.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut genome = Genome::new();
        for name in names {
            genome.insert(name.into());
        }
        Self::from_genome(genome)
    }

    /// Number of ranked chromosomes.
    pub fn len(&self) -> usize {
        self.read(|g| g.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rank(&self, chrom: &str) -> Option<usize> {
        self.read(|g| g.rank(chrom))
    }

    /// Rank of a query chromosome, appending it if it is new.
    pub fn observe(&self, chrom: &str) -> usize {
        if let Some(rank) = self.rank(chrom) {
            return rank;
        }
        let mut genome = self.ranks.write().unwrap_or_else(PoisonError::into_inner);
        genome.insert(chrom.to_string())
    }

    /// Compare two chromosomes; `None` if either has no rank yet.
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        if same_chrom(a, b) {
            return Some(Ordering::Equal);
        }
        self.read(|g| Some(g.rank(a)?.cmp(&g.rank(b)?)))
    }

    fn read<T>(&self, f: impl FnOnce(&Genome) -> T) -> T {
        f(&self.ranks.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Chromosome names in file order.
#[derive(Debug, Clone, Default)]
pub struct Genome {
    /// Map of chromosome base name to rank
    ranks: FxHashMap<String, usize>,
    /// Chromosome order (preserves input file order)
    order: Vec<String>,
}

impl Genome {
    /// Create an empty genome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load genome from a file.
    /// Format: tab-delimited with chrom\tsize per line
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut genome = Genome::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(AnnoError::Parse {
                    line: line_num + 1,
                    message: "Genome file requires two columns: chrom and size".to_string(),
                });
            }

            if fields[1].parse::<u64>().is_err() {
                return Err(AnnoError::Parse {
                    line: line_num + 1,
                    message: format!("Invalid chromosome size: {}", fields[1]),
                });
            }

            genome.insert(fields[0].to_string());
        }

        Ok(genome)
    }

    /// Position of a chromosome in file order.
    #[inline]
    pub fn rank(&self, chrom: &str) -> Option<usize> {
        self.ranks.get(chrom_base(chrom)).copied()
    }

    /// Get number of chromosomes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a chromosome if new; returns its rank.
    pub fn insert(&mut self, chrom: String) -> usize {
        let key = chrom_base(&chrom).to_string();
        if let Some(&rank) = self.ranks.get(&key) {
            return rank;
        }
        let rank = self.order.len();
        self.ranks.insert(key, rank);
        self.order.push(chrom);
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_genome_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\t1000000").unwrap();
        writeln!(file, "chr2\t500000").unwrap();
        writeln!(file, "# comment line").unwrap();
        writeln!(file, "chr3\t250000").unwrap();

        let genome = Genome::from_file(file.path()).unwrap();

        assert_eq!(genome.rank("chr1"), Some(0));
        assert_eq!(genome.rank("2"), Some(1));
        assert_eq!(genome.rank("chr3"), Some(2));
        assert_eq!(genome.rank("chr4"), None);
        assert_eq!(genome.len(), 3);
    }

    #[test]
    fn test_genome_bad_size() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\tbig").unwrap();
        assert!(matches!(
            Genome::from_file(file.path()),
            Err(AnnoError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_observed_order_follows_first_appearance() {
        let order = ChromOrder::observed();
        for chrom in ["1", "2", "X", "Y", "MT"] {
            order.observe(chrom);
        }
        assert_eq!(order.compare("Y", "MT"), Some(Ordering::Less));
        assert_eq!(order.compare("chrMT", "X"), Some(Ordering::Greater));
        assert_eq!(order.compare("1", "chr1"), Some(Ordering::Equal));
        assert_eq!(order.compare("1", "GL000192.1"), None);
        assert_eq!(order.observe("chr2"), 1);
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn test_clones_share_ranks() {
        let order = ChromOrder::observed();
        let cursor_view = order.clone();
        order.observe("chrM");
        order.observe("chr1");
        assert_eq!(cursor_view.compare("chrM", "chr1"), Some(Ordering::Less));
    }

    #[test]
    fn test_declared_order_is_extended() {
        let order = ChromOrder::from_names(["chrX", "chr1"]);
        assert_eq!(order.compare("X", "chr1"), Some(Ordering::Less));
        assert_eq!(order.rank("chrUn"), None);
        assert_eq!(order.observe("chrUn"), 2);
        assert_eq!(order.compare("chr1", "chrUn"), Some(Ordering::Less));
    }
}
