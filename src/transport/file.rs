// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of logwire.
//
// logwire is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// logwire is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with logwire.  If not,
// see <http://www.gnu.org/licenses/>.

//! Writing packets to log files.
//!
//! The same driver serves two protocols: `file` writes the binary wire format (prefixed by a
//! `SILF` magic number) so that the console can open the log later, & `text` writes one
//! formatted line per log entry (prefixed by a UTF-8 byte-order mark). Either can be rotated on a
//! calendar period, on a maximum size, or both; in that case the configured file name gets a
//! timestamp spliced in before the extension.

use crate::{
    binary::BinaryFormatter,
    error::Result,
    formatter::Formatter,
    options::LookupTable,
    packet::Packet,
    rotation::{file_name_for, FileRotate, FileRotater},
    text::{TextFormatter, BOM, DEFAULT_PATTERN},
    transport::Transport,
};

use chrono::prelude::*;

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Magic number at the start of every binary log file
pub const MAGIC: &[u8; 4] = b"SILF";

pub const DEFAULT_BINARY_FILE: &str = "log.sil";
pub const DEFAULT_TEXT_FILE: &str = "log.txt";

/// Which of the two file flavors a [`FileTransport`] writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Binary,
    Text,
}

/// Sending packets to a (possibly rotated) file
pub struct FileTransport {
    format: FileFormat,
    file_name: PathBuf,
    append: bool,
    buffer: usize,
    max_size: u64,
    rotater: FileRotater,
    formatter: Box<dyn Formatter>,
    writer: Option<BufWriter<File>>,
    current: Option<PathBuf>,
    file_size: u64,
}

impl FileTransport {
    /// A `file` protocol transport writing the binary format to `log.sil`
    pub fn binary() -> FileTransport {
        FileTransport::new(FileFormat::Binary, DEFAULT_BINARY_FILE)
    }
    /// A `text` protocol transport writing to `log.txt` with the default pattern
    pub fn text() -> FileTransport {
        FileTransport::new(FileFormat::Text, DEFAULT_TEXT_FILE)
    }
    pub fn new<P: AsRef<Path>>(format: FileFormat, file_name: P) -> FileTransport {
        FileTransport {
            format,
            file_name: file_name.as_ref().to_path_buf(),
            append: false,
            buffer: 0,
            max_size: 0,
            rotater: FileRotater::new(FileRotate::None),
            formatter: FileTransport::formatter_for(format, DEFAULT_PATTERN, false),
            writer: None,
            current: None,
            file_size: 0,
        }
    }
    /// The file currently open, if any
    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn formatter_for(format: FileFormat, pattern: &str, indent: bool) -> Box<dyn Formatter> {
        match format {
            FileFormat::Binary => Box::new(BinaryFormatter::new()),
            FileFormat::Text => Box::new(TextFormatter::new(pattern).with_indent(indent)),
        }
    }
    fn header(&self) -> &'static [u8] {
        match self.format {
            FileFormat::Binary => MAGIC,
            FileFormat::Text => &BOM,
        }
    }
    fn framing(&self) -> u64 {
        match self.format {
            FileFormat::Binary => 6,
            FileFormat::Text => 0,
        }
    }
    fn timestamped(&self) -> bool {
        self.rotater.mode() != FileRotate::None || self.max_size > 0
    }

    /// Pick the name for a new file at `now`; when rolling over within the same second we
    /// disambiguate with a counter rather than clobber the file we just closed.
    fn next_path(&self, now: &DateTime<Utc>, rolling: bool) -> PathBuf {
        let path = file_name_for(&self.file_name, self.timestamped(), now);
        if !rolling || !path.exists() {
            return path;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path.extension().map(|s| s.to_string_lossy().into_owned());
        (1..)
            .map(|n| match &ext {
                Some(ext) => path.with_file_name(format!("{}-{}.{}", stem, n, ext)),
                None => path.with_file_name(format!("{}-{}", stem, n)),
            })
            .find(|p| !p.exists())
            .unwrap_or(path)
    }

    fn open(&mut self, now: &DateTime<Utc>, rolling: bool) -> Result<()> {
        let path = self.next_path(now, rolling);
        let mut opts = OpenOptions::new();
        opts.create(true);
        if self.append {
            opts.append(true);
        } else {
            opts.write(true).truncate(true);
        }
        let file = opts.open(&path)?;
        self.file_size = file.metadata()?.len();
        let mut writer = BufWriter::with_capacity(self.buffer.max(0x2000), file);
        if self.file_size == 0 {
            let header = self.header();
            writer.write_all(header)?;
            if self.buffer == 0 {
                writer.flush()?;
            }
            self.file_size = header.len() as u64;
        }
        self.rotater.initialize(now);
        tracing::debug!(target: "logwire::transport", "opened {}", path.display());
        self.writer = Some(writer);
        self.current = Some(path);
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        self.current = None;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Transport for FileTransport {
    fn name(&self) -> &'static str {
        match self.format {
            FileFormat::Binary => "file",
            FileFormat::Text => "text",
        }
    }
    fn is_valid_option(&self, key: &str) -> bool {
        match key {
            "filename" | "append" | "buffer" | "rotate" | "maxsize" => true,
            "pattern" | "indent" => self.format == FileFormat::Text,
            _ => false,
        }
    }
    fn load_options(&mut self, options: &LookupTable) {
        let default_name = match self.format {
            FileFormat::Binary => DEFAULT_BINARY_FILE,
            FileFormat::Text => DEFAULT_TEXT_FILE,
        };
        self.file_name = PathBuf::from(options.get_string("filename", default_name));
        self.append = options.get_bool("append", false);
        self.buffer = options.get_size("buffer", 0) as usize;
        self.max_size = options.get_size("maxsize", 0);
        self.rotater = FileRotater::new(options.get_rotate("rotate", FileRotate::None));
        self.formatter = FileTransport::formatter_for(
            self.format,
            &options.get_string("pattern", DEFAULT_PATTERN),
            options.get_bool("indent", false),
        );
    }
    fn connect(&mut self) -> Result<()> {
        self.open(&Utc::now(), false)
    }
    fn write_packet(&mut self, packet: &Arc<Packet>) -> Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        let now = Utc::now();
        if self.rotater.update(&now) {
            self.close()?;
            self.open(&now, true)?;
        }
        let size = self.formatter.compile(packet);
        if size == 0 {
            return Ok(());
        }
        let record = size as u64 + self.framing();
        if self.max_size > 0
            && self.file_size > self.header().len() as u64
            && self.file_size + record > self.max_size
        {
            self.close()?;
            self.open(&now, true)?;
        }
        if let Some(writer) = self.writer.as_mut() {
            self.formatter.write(writer)?;
            if self.buffer == 0 {
                writer.flush()?;
            }
        }
        self.file_size += record;
        Ok(())
    }
    fn disconnect(&mut self) -> Result<()> {
        self.close()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::binary::decode;
    use crate::level::Level;
    use crate::packet::{LogEntry, LogEntryType, ViewerId};

    fn entry(title: &str) -> Arc<Packet> {
        let mut entry = LogEntry::new(LogEntryType::Message, ViewerId::Title);
        entry.title = title.to_string();
        Packet::log_entry(Level::Message, entry).into_shared()
    }

    fn configured(format: FileFormat, options: &str) -> FileTransport {
        let mut transpo = FileTransport::new(format, "unused");
        transpo.load_options(&LookupTable::parse(options).unwrap());
        transpo
    }

    #[test]
    fn binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sil");
        let mut transpo = configured(
            FileFormat::Binary,
            &format!("filename=\"{}\"", path.display()),
        );
        transpo.connect().unwrap();
        transpo.write_packet(&entry("first")).unwrap();
        transpo.write_packet(&entry("second")).unwrap();
        transpo.disconnect().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        let frames = decode::frames(&bytes[4..]);
        assert_eq!(frames.len(), 2);
        assert_eq!(decode::log_entry(&frames[0].payload).title, "first");

        // Without `append`, reconnecting starts over
        transpo.connect().unwrap();
        transpo.write_packet(&entry("third")).unwrap();
        transpo.disconnect().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(decode::frames(&bytes[4..]).len(), 1);
    }

    #[test]
    fn append_keeps_single_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sil");
        let mut transpo = configured(
            FileFormat::Binary,
            &format!("filename=\"{}\",append=true,buffer=4", path.display()),
        );
        for title in ["a", "b"] {
            transpo.connect().unwrap();
            transpo.write_packet(&entry(title)).unwrap();
            transpo.disconnect().unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        let frames = decode::frames(&bytes[4..]);
        assert_eq!(frames.len(), 2);
        assert_eq!(decode::log_entry(&frames[1].payload).title, "b");
    }

    #[test]
    fn text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut transpo = configured(
            FileFormat::Text,
            &format!("filename=\"{}\",pattern=\"%level%|%title%\"", path.display()),
        );
        assert_eq!(transpo.name(), "text");
        transpo.connect().unwrap();
        transpo.write_packet(&entry("hello")).unwrap();
        transpo.disconnect().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], &BOM);
        assert_eq!(std::str::from_utf8(&bytes[3..]).unwrap(), "Message|hello\r\n");
    }

    #[test]
    fn max_size_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("roll.sil");
        // 1KB cap; each entry below is a bit over 500 bytes on the wire
        let mut transpo = configured(
            FileFormat::Binary,
            &format!("filename=\"{}\",maxsize=1", base.display()),
        );
        transpo.connect().unwrap();
        let title = "t".repeat(500);
        for _ in 0..3 {
            transpo.write_packet(&entry(&title)).unwrap();
        }
        transpo.disconnect().unwrap();

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        assert!(files.len() >= 2);
        let mut total = 0;
        for file in &files {
            let name = file.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("roll-") && name.ends_with(".sil"), "{}", name);
            let bytes = std::fs::read(file).unwrap();
            assert!(bytes.len() <= 1024);
            assert_eq!(&bytes[..4], MAGIC);
            total += decode::frames(&bytes[4..]).len();
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn options() {
        let binary = FileTransport::binary();
        assert!(binary.is_valid_option("rotate"));
        assert!(!binary.is_valid_option("pattern"));
        assert!(FileTransport::text().is_valid_option("indent"));
    }
}
