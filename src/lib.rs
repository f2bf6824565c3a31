//! A pure-Rust decoder for CCSDS Space Packets described by XTCE-flavored
//! packet definitions.
//!
//! The crate root stays thin, in pcarp's style: modules own their own
//! public types, `lib.rs` just declares and re-exports. [`PacketGenerator`]
//! is the main entry point — build or load a [`PacketDefinition`], then
//! iterate a generator constructed against a byte source.

mod bitcursor;
mod builders;
mod calibrator;
mod container;
mod data_encoding;
mod definition;
mod error;
mod generator;
mod match_criteria;
mod packet;
mod parameter;
mod parameter_type;
mod stream;
mod value;
mod xtce_xml;

pub use builders::{with_ccsds_primary_header, PacketDefinitionBuilder};
pub use calibrator::{Calibrator, ContextCalibrator, SplineOrder, SplinePoint};
pub use container::{ContainerEntry, ContainerLookup, SequenceContainer};
pub use data_encoding::{
    BinaryDataEncoding, ByteOrder, DataEncoding, FloatDataEncoding, FloatFamily,
    IntegerDataEncoding, IntegerEncoding, LinearAdjust, Size, StringCharEncoding,
    StringDataEncoding,
};
pub use definition::PacketDefinition;
pub use error::{Error, Result};
pub use generator::{GeneratorOptions, PacketGenerator};
pub use match_criteria::{
    Anded, BooleanExpression, Comparison, Condition, ConditionRhs, DiscreteLookup, MatchCriteria,
    Operator, Ored,
};
pub use packet::{Packet, ParsedValue, PrimaryHeader};
pub use parameter::Parameter;
pub use parameter_type::{synthesize_time_calibrator, ParameterType, TimeEpoch};
pub use stream::{FileStreamAdapter, SliceStreamAdapter, SocketStreamAdapter, StreamAdapter};
pub use value::Value;
pub use xtce_xml::{DefinitionSource, XtceXml};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    /// Packs one CCSDS packet: header fields plus an arbitrary body. `body`
    /// must be non-empty — `PKT_LEN` is `body.len() - 1`, per CCSDS.
    fn pack(apid: u16, seq_count: u16, body: &[u8]) -> Vec<u8> {
        assert!(!body.is_empty());
        let first16 = apid & 0x07FF;
        let second16 = (0b11u16 << 14) | (seq_count & 0x3FFF);
        let pkt_len = (body.len() - 1) as u16;
        let mut out = vec![
            (first16 >> 8) as u8,
            (first16 & 0xFF) as u8,
            (second16 >> 8) as u8,
            (second16 & 0xFF) as u8,
            (pkt_len >> 8) as u8,
            (pkt_len & 0xFF) as u8,
        ];
        out.extend_from_slice(body);
        out
    }

    fn flat_header_definition() -> PacketDefinition {
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

    /// Scenario: a long flat header-only stream decodes every packet with
    /// no truncation and ends cleanly.
    #[test]
    fn decodes_a_long_flat_header_only_stream() {
        let def = flat_header_definition();
        let mut buf = Vec::new();
        for i in 0..7200u32 {
            buf.extend(pack((i % 2048) as u16, (i % 16384) as u16, &[0xAB]));
        }

        let gen = PacketGenerator::from_bytes(buf, &def, GeneratorOptions::default());
        let packets: Vec<Packet> = gen.map(|r| r.unwrap()).collect();

        assert_eq!(packets.len(), 7200);
        assert_eq!(packets[0].header.unwrap().apid, 0);
        assert_eq!(packets[7199].header.unwrap().apid, 7199 % 2048);
        for (i, p) in packets.iter().enumerate() {
            assert_eq!(p.header.unwrap().seq_count, (i % 16384) as u16);
        }
    }

    /// Scenario: APID-dispatched inheritance picks out exactly the packet
    /// whose APID matches the child container's restriction criterion, and
    /// decodes its trailing field to the exact expected value.
    #[test]
    fn apid_dispatched_inheritance_decodes_matching_packet() {
        let mut builder = PacketDefinitionBuilder::new("root");
        with_ccsds_primary_header(&mut builder);
        builder.parameter_type(
            "SHCOARSE_Type",
            ParameterType::Integer {
                encoding: DataEncoding::Integer(IntegerDataEncoding {
                    size_in_bits: 32,
                    byte_order: ByteOrder::BigEndian,
                    encoding: IntegerEncoding::Unsigned,
                    default_calibrator: None,
                    context_calibrators: vec![],
                }),
                unit: None,
            },
        );
        builder.parameter("SHCOARSE", "SHCOARSE_Type");
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
            true,
        );
        builder.container(
            "apid34",
            vec![ContainerEntry::Parameter("SHCOARSE".into())],
            Some("root".to_string()),
            vec![MatchCriteria::Comparison(Comparison {
                referenced_parameter: "PKT_APID".to_string(),
                operator: Operator::Eq,
                required_value: "34".to_string(),
                use_calibrated_value: false,
            })],
            false,
        );
        let def = builder.build().unwrap();

        const SHCOARSE: u32 = 481_168_702;
        const MATCHING_INDEX: usize = 159;
        let mut buf = Vec::new();
        for i in 0..200u32 {
            if i as usize == MATCHING_INDEX {
                buf.extend(pack(34, 0, &SHCOARSE.to_be_bytes()));
            } else {
                buf.extend(pack(999, 0, &[0, 0, 0, 0]));
            }
        }

        let gen = PacketGenerator::from_bytes(
            buf,
            &def,
            GeneratorOptions { yield_unrecognized_apids: true, ..GeneratorOptions::default() },
        );
        let packets: Vec<Packet> = gen.map(|r| r.unwrap()).collect();

        assert_eq!(packets.len(), 200);
        assert!(!packets[MATCHING_INDEX - 1].contains("SHCOARSE"));
        assert_eq!(
            packets[MATCHING_INDEX].get("SHCOARSE").unwrap().raw_value,
            Value::UInt(u64::from(SHCOARSE))
        );
    }

    /// Scenario: a polymorphic type-tag field picks between sibling
    /// containers whose trailing payloads have different widths, and each
    /// decodes to the right total byte count for its variant.
    #[test]
    fn polymorphic_type_tag_dispatches_to_differently_sized_payloads() {
        let mut builder = PacketDefinitionBuilder::new("root");
        with_ccsds_primary_header(&mut builder);

        let mut enumeration = std::collections::HashMap::new();
        enumeration.insert(0, "Low".to_string());
        enumeration.insert(1, "High".to_string());
        builder.parameter_type(
            "SCI0TYPE_Type",
            ParameterType::Enumerated {
                encoding: DataEncoding::Integer(IntegerDataEncoding {
                    size_in_bits: 8,
                    byte_order: ByteOrder::BigEndian,
                    encoding: IntegerEncoding::Unsigned,
                    default_calibrator: None,
                    context_calibrators: vec![],
                }),
                enumeration,
                unit: None,
            },
        );
        builder.parameter("SCI0TYPE", "SCI0TYPE_Type");
        builder.parameter_type(
            "SCI0RAW_LOW_Type",
            ParameterType::Integer {
                encoding: DataEncoding::Integer(IntegerDataEncoding {
                    size_in_bits: 16,
                    byte_order: ByteOrder::BigEndian,
                    encoding: IntegerEncoding::Unsigned,
                    default_calibrator: None,
                    context_calibrators: vec![],
                }),
                unit: None,
            },
        );
        builder.parameter("SCI0RAW_LOW", "SCI0RAW_LOW_Type");
        builder.parameter_type(
            "SCI0RAW_HIGH_Type",
            ParameterType::Integer {
                encoding: DataEncoding::Integer(IntegerDataEncoding {
                    size_in_bits: 32,
                    byte_order: ByteOrder::BigEndian,
                    encoding: IntegerEncoding::Unsigned,
                    default_calibrator: None,
                    context_calibrators: vec![],
                }),
                unit: None,
            },
        );
        builder.parameter("SCI0RAW_HIGH", "SCI0RAW_HIGH_Type");

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
                ContainerEntry::Parameter("SCI0TYPE".into()),
            ],
            None,
            vec![],
            true,
        );
        builder.container(
            "low",
            vec![ContainerEntry::Parameter("SCI0RAW_LOW".into())],
            Some("root".to_string()),
            vec![MatchCriteria::Comparison(Comparison {
                referenced_parameter: "SCI0TYPE".to_string(),
                operator: Operator::Eq,
                required_value: "0".to_string(),
                use_calibrated_value: false,
            })],
            false,
        );
        builder.container(
            "high",
            vec![ContainerEntry::Parameter("SCI0RAW_HIGH".into())],
            Some("root".to_string()),
            vec![MatchCriteria::Comparison(Comparison {
                referenced_parameter: "SCI0TYPE".to_string(),
                operator: Operator::Eq,
                required_value: "1".to_string(),
                use_calibrated_value: false,
            })],
            false,
        );
        let def = builder.build().unwrap();

        let low_packet = pack(1, 0, &[0x00, 0xCA, 0xFE]);
        let high_packet = pack(2, 0, &[0x01, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(low_packet.len(), 9);
        assert_eq!(high_packet.len(), 11);

        let mut buf = low_packet.clone();
        buf.extend(high_packet.clone());
        let gen = PacketGenerator::from_bytes(buf, &def, GeneratorOptions::default());
        let packets: Vec<Packet> = gen.map(|r| r.unwrap()).collect();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].raw.len(), low_packet.len());
        assert_eq!(packets[0].get("SCI0RAW_LOW").unwrap().raw_value, Value::UInt(0xCAFE));
        assert_eq!(packets[1].raw.len(), high_packet.len());
        assert_eq!(
            packets[1].get("SCI0RAW_HIGH").unwrap().raw_value,
            Value::UInt(0xDEADBEEF)
        );
    }

    /// A `Read` that only ever hands back a handful of bytes per call,
    /// standing in for a socket that fills its recv buffer incrementally —
    /// without any real OS socket, `SocketStreamAdapter`'s `ensure` loop
    /// still has to reassemble packets that span multiple reads.
    struct TrickleReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = &self.data[self.pos..];
            let n = remaining.len().min(self.chunk).min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// Scenario: streaming through a trickling reader via `SocketStreamAdapter`
    /// yields the same decoded packets, in the same order, as decoding the
    /// whole buffer directly.
    #[test]
    fn socket_style_streaming_matches_direct_decode() {
        let def = flat_header_definition();
        let mut buf = Vec::new();
        for i in 0..50u32 {
            buf.extend(pack((i % 64) as u16, i as u16, &[0x01]));
        }

        let direct = PacketGenerator::from_bytes(buf.clone(), &def, GeneratorOptions::default());
        let direct_packets: Vec<Packet> = direct.map(|r| r.unwrap()).collect();

        let trickle = TrickleReader { data: buf, pos: 0, chunk: 3 };
        let streamed = PacketGenerator::from_socket(trickle, &def, GeneratorOptions::default());
        let streamed_packets: Vec<Packet> = streamed.map(|r| r.unwrap()).collect();

        assert_eq!(direct_packets.len(), streamed_packets.len());
        for (a, b) in direct_packets.iter().zip(streamed_packets.iter()) {
            assert_eq!(a.header.unwrap().apid, b.header.unwrap().apid);
            assert_eq!(a.header.unwrap().seq_count, b.header.unwrap().seq_count);
            assert_eq!(a.raw, b.raw);
        }
    }

    /// Scenario: a definition built purely through the in-memory builders,
    /// serialized, re-parsed, and serialized again produces byte-identical
    /// XML both times.
    #[test]
    fn builder_to_xml_round_trip_is_byte_exact() {
        let def = flat_header_definition();

        let codec = XtceXml;
        let mut first = Vec::new();
        codec.write(&def, &mut first).unwrap();

        let reloaded = codec.load(&mut &first[..]).unwrap();
        let mut second = Vec::new();
        codec.write(&reloaded, &mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(reloaded.parameters.len(), def.parameters.len());
        assert_eq!(reloaded.containers["root"].entries.len(), 7);
    }

    /// Scenario: an absolute-time parameter with a synthesized
    /// scale-only-in-form (scale=1e-6, offset=0) calibrator decodes a known
    /// raw value to the exact expected derived time.
    #[test]
    fn absolute_time_calibration_matches_expected_value() {
        let pt = ParameterType::AbsoluteTime {
            encoding: DataEncoding::Integer(IntegerDataEncoding {
                size_in_bits: 32,
                byte_order: ByteOrder::BigEndian,
                encoding: IntegerEncoding::Unsigned,
                default_calibrator: synthesize_time_calibrator(Some(1e-6), Some(0.0)),
                context_calibrators: vec![],
            }),
            unit: Some("s".to_string()),
            epoch: TimeEpoch {
                epoch: "TAI".to_string(),
                offset_from: None,
            },
        };

        let packet = Packet::empty(bytes::Bytes::new());
        let mut cursor =
            crate::bitcursor::BitCursor::new(bytes::Bytes::copy_from_slice(&875_713_280u32.to_be_bytes()));
        let (raw, derived) = pt.parse_value(&mut cursor, &packet).unwrap();

        assert_eq!(raw, Value::UInt(875_713_280));
        match derived {
            Some(Value::Float(f)) => assert_eq!(f, 875.7132799999999),
            other => panic!("expected a derived float, got {other:?}"),
        }
    }
}
