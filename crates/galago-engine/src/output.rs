//! The output sink: one line per first-time valid sample.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use galago_model::sorts::Declaration;

/// Line format: `<k>: [<name>\0<kind>\0 …]<encoded-buffer>` where kind
/// is 1 for arrays, 2 for scalar constants, 3 for functions. The NUL
/// separators are literal bytes.
pub struct OutputSink {
    writer: BufWriter<File>,
}

impl OutputSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn write_sample(
        &mut self,
        level: u32,
        decls: &[Declaration],
        buffer: &[u8],
    ) -> io::Result<()> {
        let mut line = Vec::with_capacity(buffer.len() + 16 * decls.len());
        write!(line, "{level}: [")?;
        for decl in decls {
            line.extend_from_slice(decl.name.as_bytes());
            line.push(0);
            line.push(decl.kind_label());
            line.push(0);
        }
        line.push(b']');
        line.extend_from_slice(buffer);
        line.push(b'\n');
        self.writer.write_all(&line)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galago_model::sorts::Sort;

    #[test]
    fn line_layout() {
        let dir = std::env::temp_dir().join("galago-sink-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.samples");
        let decls = vec![
            Declaration::new("x", Sort::Bv(4)),
            Declaration::new("a", Sort::Array { index: 2, elem: 4 }),
        ];
        let mut sink = OutputSink::create(&path).unwrap();
        sink.write_sample(1, &decls, b"f\x00[0\x000\x00]").unwrap();
        sink.flush().unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"1: [x\x002\x00a\x001\x00]f\x00[0\x000\x00]\n");
    }
}
