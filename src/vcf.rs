//! Minimal VCF text reader and writer.
//!
//! Records keep every raw column; only the positional columns, alleles and
//! INFO are interpreted. On output the INFO column is rebuilt from the
//! record's fields, everything else is written back untouched.

use crate::error::{AnnoError, Result};
use crate::io::DEFAULT_OUTPUT_BUFFER;
use crate::record::{Alleles, FieldMeta, Record, Schema, Value};
use crate::streaming::{parse_u64_fast, split_tabs, trim_line_end};
use std::io::{BufRead, BufWriter, Write};

const INFO_COLUMN: usize = 7;

/// Meta-information lines plus the `#CHROM` column header.
#[derive(Debug, Clone, Default)]
pub struct VcfHeader {
    meta: Vec<String>,
    columns: String,
}

impl VcfHeader {
    /// Schema declared by the `##INFO` lines.
    pub fn schema(&self) -> Schema {
        let mut schema = Schema {
            has_alleles: true,
            ..Schema::default()
        };
        for line in &self.meta {
            if let Some((id, meta)) = parse_info_line(line) {
                schema.fields.insert(id, meta);
            }
        }
        schema
    }

    /// IDs of the `##contig` lines, in header order.
    pub fn contigs(&self) -> Vec<&str> {
        self.meta
            .iter()
            .filter_map(|line| {
                let body = line.strip_prefix("##contig=<")?.strip_suffix('>')?;
                body.split(',').find_map(|kv| kv.strip_prefix("ID="))
            })
            .collect()
    }

    /// Add or replace an `##INFO` declaration.
    pub fn add_info(&mut self, id: &str, meta: &FieldMeta) {
        let line = format!(
            "##INFO=<ID={},Number={},Type={},Description=\"{}\">",
            id, meta.number, meta.ty, meta.description
        );
        let existing = self
            .meta
            .iter()
            .position(|l| parse_info_line(l).is_some_and(|(other, _)| other == id));
        match existing {
            Some(i) => self.meta[i] = line,
            None => {
                // keep INFO lines together, after the last one present
                let at = self
                    .meta
                    .iter()
                    .rposition(|l| l.starts_with("##INFO="))
                    .map_or(self.meta.len(), |i| i + 1);
                self.meta.insert(at, line);
            }
        }
    }

    /// Append a free-form meta line such as `##annojoin=0.1.0`.
    pub fn add_meta(&mut self, line: impl Into<String>) {
        self.meta.push(line.into());
    }

    pub fn meta_lines(&self) -> &[String] {
        &self.meta
    }
}

fn parse_info_line(line: &str) -> Option<(String, FieldMeta)> {
    let body = line.strip_prefix("##INFO=<")?.strip_suffix('>')?;
    let mut id = None;
    let mut meta = FieldMeta {
        number: ".".to_string(),
        ty: "String".to_string(),
        description: String::new(),
    };

    let mut rest = body;
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let (value, next) = if let Some(quoted) = after.strip_prefix('"') {
            let close = quoted.find('"')?;
            let tail = &quoted[close + 1..];
            (&quoted[..close], tail.strip_prefix(',').unwrap_or(tail))
        } else {
            match after.split_once(',') {
                Some((v, n)) => (v, n),
                None => (after, ""),
            }
        };
        match key {
            "ID" => id = Some(value.to_string()),
            "Number" => meta.number = value.to_string(),
            "Type" => meta.ty = value.to_string(),
            "Description" => meta.description = value.to_string(),
            _ => {}
        }
        rest = next;
    }

    id.map(|id| (id, meta))
}

/// A streaming VCF reader.
pub struct VcfReader<R: BufRead> {
    reader: R,
    header: VcfHeader,
    line_number: usize,
    buffer: String,
}

impl<R: BufRead> VcfReader<R> {
    /// Read the header and position the reader at the first record.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header = VcfHeader::default();
        let mut buffer = String::with_capacity(1024);
        let mut line_number = 0;

        loop {
            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                return Err(AnnoError::Parse {
                    line: line_number,
                    message: "missing #CHROM header line".to_string(),
                });
            }
            line_number += 1;
            let line = trim_line_end(&buffer);
            if line.starts_with("##") {
                header.meta.push(line.to_string());
            } else if line.starts_with("#CHROM") {
                header.columns = line.to_string();
                break;
            } else {
                return Err(AnnoError::Parse {
                    line: line_number,
                    message: "expected a header line before the first record".to_string(),
                });
            }
        }

        Ok(Self {
            reader,
            header,
            line_number,
            buffer,
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    /// Read the next record.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = trim_line_end(&self.buffer);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return parse_record(line, self.line_number).map(Some);
        }
    }

    /// Get an iterator over all records.
    pub fn records(self) -> VcfRecordIter<R> {
        VcfRecordIter { reader: self }
    }
}

/// Iterator over VCF records.
pub struct VcfRecordIter<R: BufRead> {
    reader: VcfReader<R>,
}

impl<R: BufRead> Iterator for VcfRecordIter<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

fn parse_record(line: &str, line_number: usize) -> Result<Record> {
    let error = |message: String| AnnoError::Parse {
        line: line_number,
        message,
    };
    let cols = split_tabs(line);
    if cols.len() <= INFO_COLUMN {
        return Err(error(format!("expected at least 8 columns, got {}", cols.len())));
    }

    let pos = parse_u64_fast(cols[1].as_bytes())
        .filter(|&p| p > 0)
        .ok_or_else(|| error(format!("invalid position: '{}'", cols[1])))?;
    let start = pos - 1;
    let reference = cols[3];
    let end = start + reference.len() as u64;

    let alternates = if cols[4] == "." {
        Vec::new()
    } else {
        cols[4].split(',').map(str::to_string).collect()
    };

    let mut record = Record::new(cols[0], start, end);
    record.alleles = Some(Alleles::new(reference, alternates));
    if cols[INFO_COLUMN] != "." {
        for entry in cols[INFO_COLUMN].split(';').filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((key, value)) => record.fields.insert(key, Value::Str(value.to_string())),
                None => record.fields.insert(entry, Value::Flag),
            }
        }
    }
    record.columns = cols.iter().map(|c| c.to_string()).collect();
    Ok(record)
}

/// Buffered VCF writer.
pub struct VcfWriter<W: Write> {
    writer: BufWriter<W>,
    info: String,
}

impl<W: Write> VcfWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(DEFAULT_OUTPUT_BUFFER, output),
            info: String::with_capacity(256),
        }
    }

    pub fn write_header(&mut self, header: &VcfHeader) -> Result<()> {
        for line in &header.meta {
            writeln!(self.writer, "{}", line)?;
        }
        let columns = if header.columns.is_empty() {
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO"
        } else {
            &header.columns
        };
        writeln!(self.writer, "{}", columns)?;
        Ok(())
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.info.clear();
        for (key, value) in record.fields.iter() {
            if !self.info.is_empty() {
                self.info.push(';');
            }
            self.info.push_str(key);
            if *value != Value::Flag {
                self.info.push('=');
                self.info.push_str(&value.to_string());
            }
        }
        if self.info.is_empty() {
            self.info.push('.');
        }

        if record.columns.len() > INFO_COLUMN {
            for (i, col) in record.columns.iter().enumerate() {
                if i > 0 {
                    self.writer.write_all(b"\t")?;
                }
                let text = if i == INFO_COLUMN { &self.info } else { col };
                self.writer.write_all(text.as_bytes())?;
            }
        } else {
            let (reference, alternates) = match &record.alleles {
                Some(a) if !a.alternates.is_empty() => (a.reference.as_str(), a.alternates.join(",")),
                Some(a) => (a.reference.as_str(), ".".to_string()),
                None => ("N", ".".to_string()),
            };
            write!(
                self.writer,
                "{}\t{}\t.\t{}\t{}\t.\t.\t{}",
                record.span.chrom,
                itoa::Buffer::new().format(record.span.start + 1),
                reference,
                alternates,
                self.info
            )?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    const VCF: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count, in genotypes\">\n\
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t101\trs1\tA\tG,T\t50\tPASS\tAC=1,2;DB\n\
chr1\t201\t.\tAC\tA\t.\t.\t.\n";

    #[test]
    fn test_header_schema() {
        let reader = VcfReader::new(VCF.as_bytes()).unwrap();
        let schema = reader.header().schema();

        assert!(schema.has_alleles);
        let ac = schema.field("AC").unwrap();
        assert_eq!(ac.number, "A");
        assert_eq!(ac.ty, "Integer");
        assert_eq!(ac.description, "Allele count, in genotypes");
        assert_eq!(schema.field("DB").unwrap().ty, "Flag");
    }

    #[test]
    fn test_record_coordinates_and_info() {
        let records: Vec<_> = VcfReader::new(VCF.as_bytes())
            .unwrap()
            .records()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!((records[0].start(), records[0].end()), (100, 101));
        assert_eq!((records[1].start(), records[1].end()), (200, 202));
        let alleles = records[0].alleles.as_ref().unwrap();
        assert_eq!(alleles.alternates, vec!["G", "T"]);
        assert_eq!(records[0].fields.get("AC"), Some(&Value::Str("1,2".into())));
        assert_eq!(records[0].fields.get("DB"), Some(&Value::Flag));
        assert!(records[1].fields.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_untouched_columns() {
        let mut reader = VcfReader::new(VCF.as_bytes()).unwrap();
        let mut header = reader.header().clone();
        header.add_info(
            "gene",
            &FieldMeta {
                number: ".".into(),
                ty: "String".into(),
                description: "genes".into(),
            },
        );

        let mut first = reader.read_record().unwrap().unwrap();
        first.fields.insert("gene", Value::Str("BRCA1".into()));
        let second = reader.read_record().unwrap().unwrap();

        let mut out = Vec::new();
        {
            let mut writer = VcfWriter::new(&mut out);
            writer.write_header(&header).unwrap();
            writer.write_record(&first).unwrap();
            writer.write_record(&second).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines[3],
            "##INFO=<ID=gene,Number=.,Type=String,Description=\"genes\">"
        );
        assert_eq!(lines[5], "chr1\t101\trs1\tA\tG,T\t50\tPASS\tAC=1,2;DB;gene=BRCA1");
        assert_eq!(lines[6], "chr1\t201\t.\tAC\tA\t.\t.\t.");
    }

    #[test]
    fn test_header_contigs() {
        let text = "##fileformat=VCFv4.2\n\
##contig=<ID=1,length=249250621>\n\
##contig=<ID=MT,length=16569,assembly=b37>\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        let reader = VcfReader::new(text.as_bytes()).unwrap();
        assert_eq!(reader.header().contigs(), vec!["1", "MT"]);
        assert!(VcfReader::new(VCF.as_bytes()).unwrap().header().contigs().is_empty());
    }

    #[test]
    fn test_missing_header_is_an_error() {
        assert!(VcfReader::new("chr1\t1\t.\tA\tG\t.\t.\t.\n".as_bytes()).is_err());
    }

    #[test]
    fn test_short_record_is_an_error() {
        let text = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\nchr1\t1\t.\tA\n";
        let mut reader = VcfReader::new(text.as_bytes()).unwrap();
        assert!(reader.read_record().is_err());
    }
}
