//! TXT query encoding and response decoding.

use bitstream_io::{BigEndian, BitReader, BitWrite, BitWriter};
use tracing::trace;

use super::common::{MAX_NAME_LEN, PacketComponent};
use super::header::{DnsHeader, HEADER_LEN};
use super::question::DnsQuestion;
use super::{CLASS_IN, EDNS_UDP_PAYLOAD, TYPE_OPT, TYPE_TXT};
use crate::error::DnsError;

/// Upper bound on compression pointers followed while reading one name
const MAX_POINTER_HOPS: usize = 16;

/// Encode a recursive TXT query with an EDNS0 OPT record.
pub fn build_txt_query(id: u16, name: &str) -> Result<Vec<u8>, DnsError> {
    let mut header = DnsHeader::query(id);
    header.arcount = 1;
    let question = DnsQuestion::txt(name)?;

    let mut buf = Vec::with_capacity(64);
    let mut writer = BitWriter::endian(&mut buf, BigEndian);
    header.write(&mut writer)?;
    question.write(&mut writer)?;

    // OPT pseudo-record: root owner, payload size in CLASS, zero TTL and RDLEN
    writer.write_var::<u8>(8, 0)?;
    writer.write_var::<u16>(16, TYPE_OPT)?;
    writer.write_var::<u16>(16, EDNS_UDP_PAYLOAD)?;
    writer.write_var::<u32>(32, 0)?;
    writer.write_var::<u16>(16, 0)?;

    Ok(buf)
}

/// The parts of a response the TXT client cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxtResponse {
    pub id: u16,
    pub truncated: bool,
    pub rcode: u8,
    /// One entry per TXT answer, character-strings concatenated
    pub records: Vec<String>,
}

/// Decode a response message, collecting TXT answers in order.
///
/// Truncated responses are returned without their sections.
pub fn parse_txt_response(buf: &[u8]) -> Result<TxtResponse, DnsError> {
    if buf.len() < HEADER_LEN {
        return Err(DnsError::InvalidPacket(format!(
            "message too short: {} bytes",
            buf.len()
        )));
    }

    let mut header = DnsHeader::default();
    let mut reader = BitReader::endian(&buf[..HEADER_LEN], BigEndian);
    header.read(&mut reader)?;

    if !header.qr {
        return Err(DnsError::InvalidPacket("not a response".to_string()));
    }

    let mut response = TxtResponse {
        id: header.id,
        truncated: header.tc,
        rcode: header.rcode,
        records: Vec::new(),
    };
    if header.tc {
        return Ok(response);
    }

    let mut cursor = WireCursor::new(buf, HEADER_LEN);
    for _ in 0..header.qdcount {
        cursor.read_name()?;
        cursor.skip(4)?;
    }

    for _ in 0..header.ancount {
        let owner = cursor.read_name()?;
        let rtype = cursor.read_u16()?;
        let rclass = cursor.read_u16()?;
        cursor.skip(4)?;
        let rdlength = cursor.read_u16()? as usize;
        let rdata = cursor.take(rdlength)?;

        if rtype == TYPE_TXT && rclass == CLASS_IN {
            let text = join_character_strings(rdata)?;
            trace!("TXT {} -> {} bytes", owner, text.len());
            response.records.push(text);
        }
    }

    Ok(response)
}

/// Concatenate the length-prefixed character-strings of one TXT rdata
fn join_character_strings(rdata: &[u8]) -> Result<String, DnsError> {
    let mut joined = Vec::with_capacity(rdata.len());
    let mut pos = 0;
    while pos < rdata.len() {
        let len = rdata[pos] as usize;
        let chunk = rdata
            .get(pos + 1..pos + 1 + len)
            .ok_or_else(|| DnsError::InvalidPacket("TXT string overruns rdata".to_string()))?;
        joined.extend_from_slice(chunk);
        pos += 1 + len;
    }
    Ok(String::from_utf8_lossy(&joined).into_owned())
}

/// Byte-offset reader over a whole message, needed for compression pointers
struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DnsError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or_else(|| DnsError::InvalidPacket(format!("truncated at offset {}", self.pos)))?;
        self.pos += len;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), DnsError> {
        self.take(len).map(|_| ())
    }

    fn read_u16(&mut self) -> Result<u16, DnsError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a possibly compressed name and advance past its in-place encoding
    fn read_name(&mut self) -> Result<String, DnsError> {
        let mut labels = Vec::new();
        let mut pos = self.pos;
        let mut resume = None;
        let mut hops = 0;
        let mut total = 1;

        loop {
            let len = *self
                .buf
                .get(pos)
                .ok_or_else(|| DnsError::InvalidPacket("name runs past end".to_string()))?;

            match len & 0xC0 {
                0x00 if len == 0 => {
                    pos += 1;
                    break;
                }
                0x00 => {
                    let label = self
                        .buf
                        .get(pos + 1..pos + 1 + len as usize)
                        .ok_or_else(|| DnsError::InvalidPacket("label runs past end".to_string()))?;
                    total += len as usize + 1;
                    if total > MAX_NAME_LEN {
                        return Err(DnsError::NameTooLong);
                    }
                    labels.push(String::from_utf8_lossy(label).into_owned());
                    pos += 1 + len as usize;
                }
                0xC0 => {
                    let low = *self
                        .buf
                        .get(pos + 1)
                        .ok_or_else(|| DnsError::InvalidPacket("pointer runs past end".to_string()))?;
                    hops += 1;
                    if hops > MAX_POINTER_HOPS {
                        return Err(DnsError::CompressionLoop);
                    }
                    resume.get_or_insert(pos + 2);
                    pos = (((len & 0x3F) as usize) << 8) | low as usize;
                }
                _ => return Err(DnsError::InvalidLabelLength(len)),
            }
        }

        self.pos = resume.unwrap_or(pos);
        Ok(labels.join("."))
    }
}
