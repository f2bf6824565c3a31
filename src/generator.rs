//! The packet generator: the driver loop that turns a byte stream plus a
//! [`PacketDefinition`] into a lazy sequence of decoded packets.
//!
//! Mirrors pcarp's top-level `PcapNG` iterator in shape — own a stream
//! reader, produce `Result<Packet>` one call at a time, let a stream error
//! decide between end-of-iteration and a hard error — but the packet
//! boundary here comes from the CCSDS primary header's length field rather
//! than a block-type tag.

use std::io::Read;
use std::path::Path;

use bytes::Bytes;

use crate::bitcursor::BitCursor;
use crate::container::parse_container;
use crate::definition::PacketDefinition;
use crate::error::{Error, Result};
use crate::packet::{Packet, PrimaryHeader};
use crate::stream::{FileStreamAdapter, SliceStreamAdapter, SocketStreamAdapter, StreamAdapter, DEFAULT_MIN_BUFFERED};

/// Driver options, one-to-one with `spec.md`'s §4.8 option list.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Overrides the definition's own root container for this run.
    pub root_container_name: Option<String>,
    /// Bytes to skip before each packet's primary header (e.g. frame sync).
    pub skip_header_bytes: usize,
    /// Minimum buffered bytes the underlying stream adapter keeps ready.
    pub buffer_read_size_bytes: usize,
    /// Emits a `tracing::info!` line per decoded packet when set.
    pub show_progress: bool,
    /// When a container's restriction criteria exhaust without a match,
    /// yield a header-only packet instead of failing with `Coverage`.
    pub yield_unrecognized_apids: bool,
}

impl Default for GeneratorOptions {
    fn default() -> GeneratorOptions {
        GeneratorOptions {
            root_container_name: None,
            skip_header_bytes: 0,
            buffer_read_size_bytes: DEFAULT_MIN_BUFFERED,
            show_progress: false,
            yield_unrecognized_apids: false,
        }
    }
}

/// Decodes the 48-bit CCSDS primary header from exactly 6 bytes.
fn parse_primary_header(bytes: &[u8]) -> PrimaryHeader {
    let mut cursor = BitCursor::new(Bytes::copy_from_slice(bytes));
    PrimaryHeader {
        version: cursor.read_int(3).expect("6 bytes always hold 48 bits") as u8,
        packet_type: cursor.read_int(1).expect("6 bytes always hold 48 bits") as u8,
        sec_hdr_flag: cursor.read_int(1).expect("6 bytes always hold 48 bits") != 0,
        apid: cursor.read_int(11).expect("6 bytes always hold 48 bits") as u16,
        seq_flags: cursor.read_int(2).expect("6 bytes always hold 48 bits") as u8,
        seq_count: cursor.read_int(14).expect("6 bytes always hold 48 bits") as u16,
        packet_data_length: cursor.read_int(16).expect("6 bytes always hold 48 bits") as u16,
    }
}

/// Drives one byte source against one definition, yielding `Result<Packet>`
/// until clean end-of-stream. Holds the definition by reference: a
/// generator never outlives the definition it decodes against.
pub struct PacketGenerator<'def, A: StreamAdapter> {
    adapter: A,
    definition: &'def PacketDefinition,
    options: GeneratorOptions,
    finished: bool,
    packets_yielded: u64,
}

impl<'def, A: StreamAdapter> PacketGenerator<'def, A> {
    pub fn new(adapter: A, definition: &'def PacketDefinition) -> PacketGenerator<'def, A> {
        PacketGenerator::with_options(adapter, definition, GeneratorOptions::default())
    }

    pub fn with_options(
        adapter: A,
        definition: &'def PacketDefinition,
        options: GeneratorOptions,
    ) -> PacketGenerator<'def, A> {
        PacketGenerator {
            adapter,
            definition,
            options,
            finished: false,
            packets_yielded: 0,
        }
    }

    fn root_container_name(&self) -> &str {
        self.options
            .root_container_name
            .as_deref()
            .unwrap_or(&self.definition.root_container_name)
    }

    /// `Ok(None)` is clean end-of-stream; `Err` distinguishes truncation
    /// from a genuine decode error. Once either occurs the generator is
    /// done — `next()` keeps returning `None` rather than re-attempting.
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.finished {
            return Ok(None);
        }

        if self.options.skip_header_bytes > 0 {
            self.adapter.ensure(self.options.skip_header_bytes)?;
            if self.adapter.available().len() < self.options.skip_header_bytes {
                self.finished = true;
                return Ok(None);
            }
            self.adapter.consume(self.options.skip_header_bytes);
        }

        self.adapter.ensure(6)?;
        if self.adapter.available().len() < 6 {
            self.finished = true;
            if self.adapter.available().is_empty() {
                return Ok(None);
            }
            return Err(Error::Truncation);
        }
        let header = parse_primary_header(&self.adapter.available()[..6]);
        let total_size = header.total_size_bytes();

        self.adapter.ensure(total_size)?;
        if self.adapter.available().len() < total_size {
            self.finished = true;
            return Err(Error::Truncation);
        }
        let raw = Bytes::copy_from_slice(&self.adapter.available()[..total_size]);
        self.adapter.consume(total_size);

        let mut packet = Packet::empty(raw.clone());
        packet.header = Some(header);
        let mut cursor = BitCursor::new(raw);

        let root = self.root_container_name().to_string();
        match parse_container(&root, self.definition, &mut cursor, &mut packet) {
            Ok(()) => {}
            Err(Error::Coverage { container }) if self.options.yield_unrecognized_apids => {
                tracing::debug!(
                    container = %container,
                    apid = packet.header.as_ref().map(|h| h.apid),
                    "no inheritor matched; yielding header-only packet"
                );
            }
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        }

        self.packets_yielded += 1;
        if self.options.show_progress {
            tracing::info!(count = self.packets_yielded, "decoded packet");
        }
        Ok(Some(packet))
    }
}

impl<'def, A: StreamAdapter> Iterator for PacketGenerator<'def, A> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Result<Packet>> {
        match self.next_packet() {
            Ok(Some(p)) => Some(Ok(p)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'def, R: Read> PacketGenerator<'def, FileStreamAdapter<R>> {
    pub fn from_reader(
        reader: R,
        definition: &'def PacketDefinition,
        options: GeneratorOptions,
    ) -> PacketGenerator<'def, FileStreamAdapter<R>> {
        let adapter = FileStreamAdapter::with_capacity(reader, options.buffer_read_size_bytes);
        PacketGenerator::with_options(adapter, definition, options)
    }
}

impl<'def> PacketGenerator<'def, FileStreamAdapter<std::fs::File>> {
    pub fn from_file(
        path: impl AsRef<Path>,
        definition: &'def PacketDefinition,
        options: GeneratorOptions,
    ) -> Result<PacketGenerator<'def, FileStreamAdapter<std::fs::File>>> {
        let file = std::fs::File::open(path)?;
        Ok(PacketGenerator::from_reader(file, definition, options))
    }
}

impl<'def, R: Read> PacketGenerator<'def, SocketStreamAdapter<R>> {
    pub fn from_socket(
        reader: R,
        definition: &'def PacketDefinition,
        options: GeneratorOptions,
    ) -> PacketGenerator<'def, SocketStreamAdapter<R>> {
        let adapter = SocketStreamAdapter::with_capacity(reader, options.buffer_read_size_bytes);
        PacketGenerator::with_options(adapter, definition, options)
    }
}

impl<'def> PacketGenerator<'def, SliceStreamAdapter> {
    pub fn from_bytes(
        buf: impl Into<Bytes>,
        definition: &'def PacketDefinition,
        options: GeneratorOptions,
    ) -> PacketGenerator<'def, SliceStreamAdapter> {
        PacketGenerator::with_options(SliceStreamAdapter::new(buf), definition, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{with_ccsds_primary_header, PacketDefinitionBuilder};
    use crate::container::ContainerEntry;
    use crate::match_criteria::{Comparison, MatchCriteria, Operator};

    fn header_only_definition() -> PacketDefinition {
        let mut builder = PacketDefinitionBuilder::new("root");
        with_ccsds_primary_header(&mut builder);
        builder.container(
            "root",
            vec![
                ContainerEntry::Parameter("VERSION".into()),
                ContainerEntry::Parameter("TYPE".into()),
                ContainerEntry::Parameter("SEC_HDR_FLG".into()),
                ContainerEntry::Parameter("PKT_APID".into()),
                ContainerEntry::Parameter("SEQ_FLGS".into()),
                ContainerEntry::Parameter("PKT_SEQ_CNT".into()),
                ContainerEntry::Parameter("PKT_LEN".into()),
            ],
            None,
            vec![],
            false,
        );
        builder.build().unwrap()
    }

    /// `apid` in the low 11 bits, seq flags fixed at `0b11` (unsegmented),
    /// sequence count 0, a single trailing data byte, no secondary header.
    fn packet_bytes(apid: u16, data_byte: u8) -> Vec<u8> {
        let first16 = apid & 0x07FF;
        let second16: u16 = 0b11 << 14;
        let pkt_len: u16 = 0; // data_length - 1 == 0 -> 1 trailing byte
        vec![
            (first16 >> 8) as u8,
            (first16 & 0xFF) as u8,
            (second16 >> 8) as u8,
            (second16 & 0xFF) as u8,
            (pkt_len >> 8) as u8,
            (pkt_len & 0xFF) as u8,
            data_byte,
        ]
    }

    #[test]
    fn decodes_two_packets_then_ends_cleanly() {
        let def = header_only_definition();
        let mut buf = packet_bytes(10, 0xFF);
        buf.extend(packet_bytes(20, 0xAA));

        let gen = PacketGenerator::from_bytes(buf, &def, GeneratorOptions::default());
        let packets: Vec<Packet> = gen.map(|r| r.unwrap()).collect();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header.unwrap().apid, 10);
        assert_eq!(packets[1].header.unwrap().apid, 20);
    }

    #[test]
    fn mid_packet_truncation_is_reported() {
        let def = header_only_definition();
        let mut buf = packet_bytes(10, 0xFF);
        buf.truncate(4); // cut the header short

        let mut gen = PacketGenerator::from_bytes(buf, &def, GeneratorOptions::default());
        assert!(matches!(gen.next().unwrap().unwrap_err(), Error::Truncation));
        assert!(gen.next().is_none());
    }

    #[test]
    fn unrecognized_apid_yields_header_only_packet_when_opted_in() {
        let mut builder = PacketDefinitionBuilder::new("root");
        with_ccsds_primary_header(&mut builder);
        builder.container(
            "root",
            vec![ContainerEntry::Parameter("PKT_APID".into())],
            None,
            vec![],
            true,
        );
        builder.container(
            "known",
            vec![],
            Some("root".to_string()),
            vec![MatchCriteria::Comparison(Comparison {
                referenced_parameter: "PKT_APID".to_string(),
                operator: Operator::Eq,
                required_value: "10".to_string(),
                use_calibrated_value: false,
            })],
            false,
        );
        let def = builder.build().unwrap();
        let buf = packet_bytes(99, 0x00);

        let mut gen = PacketGenerator::from_bytes(
            buf.clone(),
            &def,
            GeneratorOptions { yield_unrecognized_apids: true, ..GeneratorOptions::default() },
        );
        let packet = gen.next().unwrap().unwrap();
        assert_eq!(packet.get("PKT_APID").unwrap().raw_value, crate::value::Value::UInt(99));
        assert!(gen.next().is_none());

        let mut strict = PacketGenerator::from_bytes(buf, &def, GeneratorOptions::default());
        assert!(matches!(strict.next().unwrap().unwrap_err(), Error::Coverage { .. }));
    }
}
