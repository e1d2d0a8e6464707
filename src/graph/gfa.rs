//! GFA v1 interchange and MSA conversion.
//!
//! Reference clusters arrive as multiple sequence alignments; they are
//! collapsed into GFA segments/links/paths and from there into [`Graph`]s.
//! Weighted graphs are written back out as GFA with a `KC:i:` optional field
//! carrying each segment's rounded k-mer mass.

use super::Graph;
use crate::errors::ArgotError;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct GfaSegment {
    pub name: String,
    pub sequence: Vec<u8>,
    /// `KC:i:` optional field, when present.
    pub kmer_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GfaLink {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GfaPath {
    pub name: String,
    pub segments: Vec<String>,
}

/// A parsed GFA instance (segments, links and paths; orientations are assumed
/// to be forward, as produced by the MSA converter).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gfa {
    pub comments: Vec<String>,
    pub segments: Vec<GfaSegment>,
    pub links: Vec<GfaLink>,
    pub paths: Vec<GfaPath>,
}

impl Gfa {
    pub fn from_file(path: &Path) -> Result<Gfa> {
        let fh = File::open(path).context(format!("opening GFA file {:?}", path))?;
        Gfa::parse(BufReader::new(fh)).context(format!("parsing GFA file {:?}", path))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Gfa> {
        let mut gfa = Gfa::default();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            match fields.next() {
                Some("#") | Some("H") => {
                    if line.starts_with('#') {
                        gfa.comments.push(line.trim_start_matches(['#', '\t', ' ']).to_string());
                    }
                }
                Some("S") => {
                    let name = fields
                        .next()
                        .context(format!("segment record missing a name (line {})", line_no + 1))?
                        .to_string();
                    let sequence = fields
                        .next()
                        .context(format!("segment record missing a sequence (line {})", line_no + 1))?
                        .as_bytes()
                        .to_vec();
                    if sequence.is_empty() {
                        bail!("segment {} has an empty sequence (line {})", name, line_no + 1);
                    }
                    let kmer_count = fields
                        .find_map(|f| f.strip_prefix("KC:i:"))
                        .and_then(|v| v.parse::<u64>().ok());
                    gfa.segments.push(GfaSegment {
                        name,
                        sequence,
                        kmer_count,
                    });
                }
                Some("L") => {
                    let from = fields
                        .next()
                        .context(format!("link record missing 'from' (line {})", line_no + 1))?
                        .to_string();
                    let _from_orient = fields.next();
                    let to = fields
                        .next()
                        .context(format!("link record missing 'to' (line {})", line_no + 1))?
                        .to_string();
                    gfa.links.push(GfaLink { from, to });
                }
                Some("P") => {
                    let name = fields
                        .next()
                        .context(format!("path record missing a name (line {})", line_no + 1))?
                        .to_string();
                    let segments = fields
                        .next()
                        .context(format!("path record missing segments (line {})", line_no + 1))?
                        .split(',')
                        .map(|s| s.trim_end_matches(['+', '-']).to_string())
                        .collect();
                    gfa.paths.push(GfaPath { name, segments });
                }
                // other record types are not produced by the MSA converter
                _ => {}
            }
        }
        Ok(gfa)
    }
}

impl Graph {
    /// Write the graph as weighted GFA.
    ///
    /// Segments carry `KC:i:` with their rounded k-mer mass; only paths with a
    /// non-zero recorded length are written. Returns `false` (and writes
    /// nothing) when no node of the graph gained any mass.
    pub fn save_gfa(&self, path: &Path) -> Result<bool> {
        if !self.nodes.iter().flatten().any(|n| n.kmer_mass > 0.0) {
            return Ok(false);
        }
        let fh = File::create(path).context(format!("creating GFA file {:?}", path))?;
        let mut out = BufWriter::new(fh);
        writeln!(out, "H\tVN:Z:1.0")?;
        writeln!(
            out,
            "#\tvariation graph {} weighted by argot {}",
            self.graph_id,
            crate::VERSION
        )?;
        writeln!(
            out,
            "#\tsegment weights approximate k-mer frequencies from projected read sketches"
        )?;

        for node in self.nodes.iter().flatten() {
            writeln!(
                out,
                "S\t{}\t{}\tKC:i:{}",
                node.segment_id,
                String::from_utf8_lossy(&node.sequence),
                node.kmer_mass.round() as u64
            )?;
            for edge in &node.out_edges {
                writeln!(out, "L\t{}\t+\t{}\t+\t0M", node.segment_id, edge)?;
            }
        }

        for path_id in self.surviving_path_ids() {
            let mut segments = Vec::new();
            let mut overlaps = Vec::new();
            for node in self.nodes.iter().flatten() {
                if node.path_ids.contains(&path_id) {
                    segments.push(format!("{}+", node.segment_id));
                    overlaps.push(format!("{}M", node.sequence.len()));
                }
            }
            writeln!(
                out,
                "P\t{}\t{}\t{}",
                String::from_utf8_lossy(&self.paths[&path_id]),
                segments.join(","),
                overlaps.join(",")
            )?;
        }
        Ok(true)
    }
}

/// Read a multiple sequence alignment (aligned FASTA, `-` for gaps).
pub fn read_msa(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut reader = needletail::parse_fastx_file(path)
        .context(format!("opening MSA file {:?}", path))?;
    let mut records = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.context(format!("reading MSA record in {:?}", path))?;
        let id = String::from_utf8_lossy(record.id()).to_string();
        records.push((id, record.seq().into_owned()));
    }
    if records.is_empty() {
        bail!("MSA file {:?} contains no sequences", path);
    }
    Ok(records)
}

/// Collapse an MSA into a GFA instance.
///
/// Alignment columns are grouped by the partition they induce on the
/// sequences (which sequence carries which base); runs of columns with an
/// identical partition merge into a single segment per partition class.
/// Links record per-sequence adjacency and every input sequence becomes a
/// path, so concatenating a path's segments reproduces the ungapped input.
pub fn msa_to_gfa(records: &[(String, Vec<u8>)]) -> Result<Gfa, ArgotError> {
    let aligned_len = records.first().map(|(_, s)| s.len()).unwrap_or(0);
    if records.iter().any(|(_, s)| s.len() != aligned_len) {
        return Err(ArgotError::UnalignedMsa);
    }

    // nodes under construction, one per partition class of the current run
    struct OpenNode {
        members: Vec<usize>,
        id: u64,
        sequence: Vec<u8>,
    }

    let mut next_id: u64 = 1;
    let mut open: Vec<OpenNode> = Vec::new();
    let mut segments: Vec<GfaSegment> = Vec::new();
    let mut edges: BTreeSet<(u64, u64)> = BTreeSet::new();
    let mut last_node: Vec<Option<u64>> = vec![None; records.len()];
    let mut path_nodes: Vec<Vec<u64>> = vec![Vec::new(); records.len()];

    let flush = |open: &mut Vec<OpenNode>, segments: &mut Vec<GfaSegment>| {
        for node in open.drain(..) {
            segments.push(GfaSegment {
                name: node.id.to_string(),
                sequence: node.sequence,
                kmer_count: None,
            });
        }
    };

    for col in 0..aligned_len {
        // partition the sequences by the base they carry in this column;
        // gapped sequences sit the column out
        let mut groups: Vec<(Vec<usize>, u8)> = Vec::new();
        for (seq_idx, (_, seq)) in records.iter().enumerate() {
            let base = seq[col];
            if base == b'-' {
                continue;
            }
            match groups.iter_mut().find(|(_, b)| *b == base) {
                Some((members, _)) => members.push(seq_idx),
                None => groups.push((vec![seq_idx], base)),
            }
        }
        if groups.is_empty() {
            continue;
        }
        groups.sort_by(|a, b| a.0.cmp(&b.0));

        let same_partition = open.len() == groups.len()
            && open
                .iter()
                .zip(groups.iter())
                .all(|(node, (members, _))| node.members == *members);

        if same_partition {
            for (node, (_, base)) in open.iter_mut().zip(groups.iter()) {
                node.sequence.push(super::normalise_base(*base));
            }
            continue;
        }

        // the partition changed: close the current run and open fresh nodes
        flush(&mut open, &mut segments);
        for (members, base) in groups {
            let id = next_id;
            next_id += 1;
            for &seq_idx in &members {
                if let Some(prev) = last_node[seq_idx] {
                    edges.insert((prev, id));
                }
                last_node[seq_idx] = Some(id);
                path_nodes[seq_idx].push(id);
            }
            open.push(OpenNode {
                members,
                id,
                sequence: vec![super::normalise_base(base)],
            });
        }
    }
    flush(&mut open, &mut segments);

    let links = edges
        .into_iter()
        .map(|(from, to)| GfaLink {
            from: from.to_string(),
            to: to.to_string(),
        })
        .collect();
    let paths = records
        .iter()
        .zip(path_nodes)
        .map(|((name, _), nodes)| GfaPath {
            name: name.clone(),
            segments: nodes.iter().map(|id| id.to_string()).collect(),
        })
        .collect();

    Ok(Gfa {
        comments: Vec::new(),
        segments,
        links,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msa_collapses_shared_runs() {
        let msa = vec![
            ("allele-1".to_string(), b"ACGTAC".to_vec()),
            ("allele-2".to_string(), b"ACCTAC".to_vec()),
        ];
        let gfa = msa_to_gfa(&msa).unwrap();
        // shared prefix, branch at the SNP, shared suffix
        assert_eq!(gfa.segments.len(), 4);
        assert_eq!(gfa.paths.len(), 2);
        assert_eq!(gfa.paths[0].segments.len(), 3);
        assert_eq!(gfa.paths[1].segments.len(), 3);
    }

    #[test]
    fn msa_with_gaps_reproduces_ungapped_paths() {
        let msa = vec![
            ("a".to_string(), b"ACGT".to_vec()),
            ("b".to_string(), b"A--T".to_vec()),
        ];
        let gfa = msa_to_gfa(&msa).unwrap();
        let graph = Graph::from_gfa(&gfa, 0).unwrap();
        assert_eq!(graph.path_sequence(0), b"ACGT".to_vec());
        assert_eq!(graph.path_sequence(1), b"AT".to_vec());
    }

    #[test]
    fn ragged_msa_is_rejected() {
        let msa = vec![
            ("a".to_string(), b"ACGT".to_vec()),
            ("b".to_string(), b"ACG".to_vec()),
        ];
        assert!(msa_to_gfa(&msa).is_err());
    }

    #[test]
    fn parse_round_trips_segments_and_paths() {
        let text = "H\tVN:Z:1.0\nS\t1\tACGT\tKC:i:12\nS\t2\tGG\nL\t1\t+\t2\t+\t0M\nP\tref\t1+,2+\t4M,2M\n";
        let gfa = Gfa::parse(text.as_bytes()).unwrap();
        assert_eq!(gfa.segments.len(), 2);
        assert_eq!(gfa.segments[0].kmer_count, Some(12));
        assert_eq!(gfa.links.len(), 1);
        assert_eq!(gfa.paths[0].segments, vec!["1".to_string(), "2".to_string()]);
    }
}
