use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::error::{ReadPropError, Result};
use super::fs::is_gzipped;

const IO_BUFFER_BYTES: usize = 256 * 1024;

/// Byte sink for report files, optionally gzip-compressed.
///
/// Unlike a boxed writer, the compressed variant can be finished explicitly so
/// trailer write failures surface as errors instead of being lost on drop.
pub enum OutputStream {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputStream {
    pub fn new(file: File, gzipped: bool) -> Self {
        let writer = BufWriter::with_capacity(IO_BUFFER_BYTES, file);
        if gzipped {
            OutputStream::Gzip(GzEncoder::new(writer, Compression::default()))
        } else {
            OutputStream::Plain(writer)
        }
    }

    /// Flush every layer and sync the file to disk.
    pub fn finish(self) -> io::Result<()> {
        let writer = match self {
            OutputStream::Plain(writer) => writer,
            OutputStream::Gzip(encoder) => encoder.finish()?,
        };
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Plain(w) => w.write(buf),
            OutputStream::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(w) => w.flush(),
            OutputStream::Gzip(w) => w.flush(),
        }
    }
}

/// Build a comma-separated writer.
///
/// With `write_headers` the header row is derived from the first serialized
/// record, so a table with no rows comes out empty.
pub fn csv_writer<W: Write>(inner: W, write_headers: bool) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b',')
        .has_headers(write_headers)
        .from_writer(inner)
}

/// Open a headed comma-separated table, transparently decompressing `.gz` input.
pub fn open_table_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<Box<dyn Read>>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ReadPropError::precondition(path, format!("cannot open table: {}", e))
    })?;

    let reader: Box<dyn BufRead> = if is_gzipped(path) {
        Box::new(BufReader::with_capacity(
            IO_BUFFER_BYTES,
            MultiGzDecoder::new(file),
        ))
    } else {
        Box::new(BufReader::with_capacity(IO_BUFFER_BYTES, file))
    };

    Ok(csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .from_reader(Box::new(reader) as Box<dyn Read>))
}
