//! Message framing for the external-builder wire protocol (`spec.md`
//! §6). Every frame is `tag(u8) | len(u32 LE) | payload[len]`; `len` is
//! the payload's byte count, not counting the 5-byte frame prefix
//! itself. Numeric fields inside a payload are little-endian, matching
//! the `Reader`/`Writer` convention `header.rs` uses for the on-disk
//! superblock.

use std::io::{Read, Write};

use crate::error::FrameError;
use crate::row_id::RowId;
use crate::vector::{Metric, Quantization};

/// Frames larger than this are rejected outright rather than causing an
/// unbounded allocation while decoding a corrupt or hostile stream.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

const TAG_INIT: u8 = 1;
const TAG_CODEBOOK_BLOCK: u8 = 2;
const TAG_TUPLE: u8 = 3;
const TAG_END: u8 = 4;
const TAG_RESPONSE: u8 = 5;

/// One message in the external-builder byte stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Sent once, first: the parameters the remote builder should build
    /// against.
    Init {
        dim: u32,
        m: u32,
        ef_construction: u32,
        metric: Metric,
        quantization: Quantization,
    },
    /// One trained PQ codebook, identified by its subvector index, sent
    /// only when `quantization` is `ProductQuantized`.
    CodebookBlock { subvector_index: u32, centroids: Vec<u8> },
    /// One `(label, vector)` pair to fold into the remote graph.
    Tuple { label: RowId, vector_bytes: Vec<u8> },
    /// Marks the end of the tuple stream; the builder replies with
    /// exactly one [`Message::Response`].
    End,
    /// The builder's reply: node/byte counts followed by the packed
    /// page image (fed into bulk-build's page-placement pass from the
    /// point the slots are already assigned).
    Response { num_nodes: u64, index_size: u64, image: Vec<u8> },
}

fn metric_tag(metric: Metric) -> u8 {
    match metric {
        Metric::L2Sq => 0,
        Metric::Cosine => 1,
        Metric::InnerProduct => 2,
        Metric::Hamming => 3,
    }
}

fn metric_from_tag(tag: u8) -> Result<Metric, FrameError> {
    Ok(match tag {
        0 => Metric::L2Sq,
        1 => Metric::Cosine,
        2 => Metric::InnerProduct,
        3 => Metric::Hamming,
        other => return Err(FrameError::UnknownTag(other)),
    })
}

fn quantization_tag(q: &Quantization) -> (u8, u32, u32) {
    match *q {
        Quantization::F32 => (0, 0, 0),
        Quantization::F16 => (1, 0, 0),
        Quantization::I8 => (2, 0, 0),
        Quantization::Binary => (3, 0, 0),
        Quantization::ProductQuantized { subvectors, centroids } => (4, subvectors, centroids),
    }
}

fn quantization_from_tag(tag: u8, subvectors: u32, centroids: u32) -> Result<Quantization, FrameError> {
    Ok(match tag {
        0 => Quantization::F32,
        1 => Quantization::F16,
        2 => Quantization::I8,
        3 => Quantization::Binary,
        4 => Quantization::ProductQuantized { subvectors, centroids },
        other => return Err(FrameError::UnknownTag(other)),
    })
}

impl Message {
    /// Encode this message as one complete frame (tag + length prefix +
    /// payload) and append it to `out`.
    pub fn encode(&self, out: &mut impl Write) -> Result<(), FrameError> {
        let (tag, payload) = self.encode_payload();
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(FrameError::PayloadTooLarge(payload.len(), MAX_PAYLOAD_BYTES));
        }
        out.write_all(&[tag])?;
        out.write_all(&(payload.len() as u32).to_le_bytes())?;
        out.write_all(&payload)?;
        Ok(())
    }

    fn encode_payload(&self) -> (u8, Vec<u8>) {
        let mut payload = Vec::new();
        match self {
            Message::Init { dim, m, ef_construction, metric, quantization } => {
                payload.extend_from_slice(&dim.to_le_bytes());
                payload.extend_from_slice(&m.to_le_bytes());
                payload.extend_from_slice(&ef_construction.to_le_bytes());
                payload.push(metric_tag(*metric));
                let (qtag, subvectors, centroids) = quantization_tag(quantization);
                payload.push(qtag);
                payload.extend_from_slice(&subvectors.to_le_bytes());
                payload.extend_from_slice(&centroids.to_le_bytes());
                (TAG_INIT, payload)
            }
            Message::CodebookBlock { subvector_index, centroids } => {
                payload.extend_from_slice(&subvector_index.to_le_bytes());
                payload.extend_from_slice(&(centroids.len() as u32).to_le_bytes());
                payload.extend_from_slice(centroids);
                (TAG_CODEBOOK_BLOCK, payload)
            }
            Message::Tuple { label, vector_bytes } => {
                payload.extend_from_slice(&label.to_label_bytes());
                payload.extend_from_slice(&(vector_bytes.len() as u32).to_le_bytes());
                payload.extend_from_slice(vector_bytes);
                (TAG_TUPLE, payload)
            }
            Message::End => (TAG_END, payload),
            Message::Response { num_nodes, index_size, image } => {
                payload.extend_from_slice(&num_nodes.to_le_bytes());
                payload.extend_from_slice(&index_size.to_le_bytes());
                payload.extend_from_slice(image);
                (TAG_RESPONSE, payload)
            }
        }
    }

    /// Decode one complete frame from `input`. Returns `Ok(None)` at a
    /// clean end-of-stream (no bytes available for a new frame's tag).
    pub fn decode(input: &mut impl Read) -> Result<Option<Message>, FrameError> {
        let mut tag_byte = [0u8; 1];
        match input.read(&mut tag_byte)? {
            0 => return Ok(None),
            _ => {}
        }
        let mut len_bytes = [0u8; 4];
        input.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_PAYLOAD_BYTES {
            return Err(FrameError::PayloadTooLarge(len, MAX_PAYLOAD_BYTES));
        }
        let mut payload = vec![0u8; len];
        input.read_exact(&mut payload).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::Truncated { expected: len, actual: 0 }
            } else {
                FrameError::Io(e)
            }
        })?;

        let message = match tag_byte[0] {
            TAG_INIT => {
                require_len(&payload, 4 + 4 + 4 + 1 + 1 + 4 + 4)?;
                let dim = read_u32(&payload, 0);
                let m = read_u32(&payload, 4);
                let ef_construction = read_u32(&payload, 8);
                let metric = metric_from_tag(payload[12])?;
                let qtag = payload[13];
                let subvectors = read_u32(&payload, 14);
                let centroids = read_u32(&payload, 18);
                let quantization = quantization_from_tag(qtag, subvectors, centroids)?;
                Message::Init { dim, m, ef_construction, metric, quantization }
            }
            TAG_CODEBOOK_BLOCK => {
                require_len(&payload, 8)?;
                let subvector_index = read_u32(&payload, 0);
                let n = read_u32(&payload, 4) as usize;
                require_len(&payload, 8 + n)?;
                Message::CodebookBlock { subvector_index, centroids: payload[8..8 + n].to_vec() }
            }
            TAG_TUPLE => {
                require_len(&payload, 8 + 4)?;
                let label_bytes: [u8; 8] = payload[0..8].try_into().expect("8 bytes");
                let mut label6 = [0u8; 6];
                label6.copy_from_slice(&label_bytes[0..6]);
                let n = read_u32(&payload, 8) as usize;
                require_len(&payload, 12 + n)?;
                Message::Tuple { label: RowId::new(label6), vector_bytes: payload[12..12 + n].to_vec() }
            }
            TAG_END => {
                require_len(&payload, 0)?;
                Message::End
            }
            TAG_RESPONSE => {
                require_len(&payload, 8 + 8)?;
                let num_nodes = read_u64(&payload, 0);
                let index_size = read_u64(&payload, 8);
                Message::Response { num_nodes, index_size, image: payload[16..].to_vec() }
            }
            other => return Err(FrameError::UnknownTag(other)),
        };
        Ok(Some(message))
    }
}

fn require_len(payload: &[u8], min: usize) -> Result<(), FrameError> {
    if payload.len() < min {
        return Err(FrameError::Truncated { expected: min, actual: payload.len() });
    }
    Ok(())
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4 bytes"))
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) {
        let mut buf = Vec::new();
        message.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = Message::decode(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn init_round_trips() {
        round_trip(Message::Init {
            dim: 128,
            m: 16,
            ef_construction: 128,
            metric: Metric::Cosine,
            quantization: Quantization::F32,
        });
    }

    #[test]
    fn init_with_product_quantization_round_trips() {
        round_trip(Message::Init {
            dim: 128,
            m: 16,
            ef_construction: 128,
            metric: Metric::L2Sq,
            quantization: Quantization::ProductQuantized { subvectors: 8, centroids: 256 },
        });
    }

    #[test]
    fn codebook_block_round_trips() {
        round_trip(Message::CodebookBlock { subvector_index: 3, centroids: vec![1, 2, 3, 4, 5] });
    }

    #[test]
    fn tuple_round_trips() {
        round_trip(Message::Tuple { label: RowId::new([9, 8, 7, 6, 5, 4]), vector_bytes: vec![0, 1, 2, 3] });
    }

    #[test]
    fn end_round_trips() {
        round_trip(Message::End);
    }

    #[test]
    fn response_round_trips() {
        round_trip(Message::Response { num_nodes: 42, index_size: 8192, image: vec![0xAB; 100] });
    }

    #[test]
    fn a_sequence_of_messages_decodes_in_order() {
        let messages = vec![
            Message::Init { dim: 3, m: 4, ef_construction: 16, metric: Metric::L2Sq, quantization: Quantization::F32 },
            Message::Tuple { label: RowId::new([1; 6]), vector_bytes: vec![0, 0, 128, 63] },
            Message::Tuple { label: RowId::new([2; 6]), vector_bytes: vec![0, 0, 0, 64] },
            Message::End,
        ];
        let mut buf = Vec::new();
        for m in &messages {
            m.encode(&mut buf).unwrap();
        }
        let mut cursor = std::io::Cursor::new(buf);
        let mut decoded = Vec::new();
        while let Some(m) = Message::decode(&mut cursor).unwrap() {
            decoded.push(m);
        }
        assert_eq!(decoded, messages);
    }

    #[test]
    fn decode_of_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        assert!(Message::decode(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = Vec::new();
        buf.push(0xFF);
        buf.extend_from_slice(&0u32.to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(Message::decode(&mut cursor), Err(FrameError::UnknownTag(0xFF))));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut buf = Vec::new();
        buf.push(TAG_TUPLE);
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 5]); // far short of the declared length
        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(Message::decode(&mut cursor), Err(FrameError::Truncated { .. })));
    }
}
