use domain::roster::{RosterEntries, RosterEntry, RosterError, RosterRepository};
use csv::StringRecord;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::instrument;

/// Reads the roster from a headerless, comma-delimited file with exactly two
/// fields per row: the member handle and the role name.
pub struct CsvRosterRepository {
    path: PathBuf,
}

impl CsvRosterRepository {
    #[instrument(level = "trace", skip_all)]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RosterRepository for CsvRosterRepository {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn open(&self) -> Result<RosterEntries, RosterError> {
        let file = File::open(&self.path)
            .map_err(|e| RosterError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        Ok(read_entries(file))
    }
}

/// Passes bytes through while remembering where each non-blank line starts,
/// so records can be mapped back to the line an operator sees in an editor.
struct LineIndexReader<R> {
    inner: R,
    offset: u64,
    line: u64,
    line_start: u64,
    line_has_content: bool,
    content_lines: Vec<(u64, u64)>,
}

impl<R: Read> LineIndexReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            line: 1,
            line_start: 0,
            line_has_content: false,
            content_lines: Vec::new(),
        }
    }

    /// Line of the first non-blank line starting at or after `byte`. Record
    /// positions may point at the terminator of the previous row or at
    /// skipped blank lines.
    fn line_at(&self, byte: u64) -> Option<u64> {
        let index = self
            .content_lines
            .partition_point(|(start, _)| *start < byte);
        self.content_lines.get(index).map(|(_, line)| *line)
    }
}

impl<R: Read> Read for LineIndexReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;

        for byte in &buf[..read] {
            match byte {
                b'\n' => {
                    self.line += 1;
                    self.line_start = self.offset + 1;
                    self.line_has_content = false;
                }
                b'\r' => {}
                _ if !self.line_has_content => {
                    self.line_has_content = true;
                    self.content_lines.push((self.line_start, self.line));
                }
                _ => {}
            }
            self.offset += 1;
        }

        Ok(read)
    }
}

struct CsvRosterEntries<R> {
    reader: csv::Reader<LineIndexReader<R>>,
    record: StringRecord,
    index: u64,
}

impl<R: Read> CsvRosterEntries<R> {
    fn line(&self, position: Option<&csv::Position>) -> u64 {
        position
            .and_then(|position| self.reader.get_ref().line_at(position.byte()))
            .unwrap_or(self.index)
    }
}

impl<R: Read> Iterator for CsvRosterEntries<R> {
    type Item = Result<RosterEntry, RosterError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.index += 1;

        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.line(self.record.position());
                Some(RosterEntry::from_fields(line, self.record.iter()))
            }
            Err(e) => Some(Err(RosterError::Malformed {
                line: self.line(e.position()),
                reason: e.to_string(),
            })),
        }
    }
}

pub fn read_entries<R: Read + Send + 'static>(reader: R) -> RosterEntries {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(LineIndexReader::new(reader));

    Box::new(CsvRosterEntries {
        reader,
        record: StringRecord::new(),
        index: 0,
    })
}
