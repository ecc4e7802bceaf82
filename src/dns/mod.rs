//! Minimal DNS client for TXT lookups.

pub mod client;
pub mod common;
pub mod header;
pub mod message;
pub mod question;

use async_trait::async_trait;

pub use client::DnsTxtClient;

pub const TYPE_TXT: u16 = 16;
pub const TYPE_OPT: u16 = 41;
pub const CLASS_IN: u16 = 1;
pub const RCODE_NXDOMAIN: u8 = 3;
/// UDP payload size advertised through EDNS0
pub const EDNS_UDP_PAYLOAD: u16 = 1232;

/// Source of TXT records for a name.
///
/// Lookup failures are reported as an empty record set, the same as a name
/// with no TXT records.
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn lookup_txt(&self, name: &str) -> Vec<String>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use bitstream_io::{BigEndian, BitWrite, BitWriter};

    use super::common::PacketComponent;
    use super::header::DnsHeader;
    use super::question::DnsQuestion;
    use super::{CLASS_IN, TYPE_TXT};

    /// Builds response messages the way a recursive server would
    pub struct ResponseBuilder {
        header: DnsHeader,
        question: DnsQuestion,
        answers: Vec<(u16, Vec<u8>)>,
    }

    impl ResponseBuilder {
        pub fn new(id: u16, name: &str) -> Self {
            let mut header = DnsHeader::query(id);
            header.qr = true;
            header.ra = true;
            Self {
                header,
                question: DnsQuestion::txt(name).unwrap(),
                answers: Vec::new(),
            }
        }

        pub fn txt(self, strings: &[&str]) -> Self {
            let mut rdata = Vec::new();
            for s in strings {
                rdata.push(s.len() as u8);
                rdata.extend_from_slice(s.as_bytes());
            }
            self.record(TYPE_TXT, &rdata)
        }

        pub fn record(mut self, rtype: u16, rdata: &[u8]) -> Self {
            self.answers.push((rtype, rdata.to_vec()));
            self
        }

        pub fn rcode(mut self, rcode: u8) -> Self {
            self.header.rcode = rcode;
            self
        }

        pub fn truncated(mut self) -> Self {
            self.header.tc = true;
            self
        }

        pub fn build(mut self) -> Vec<u8> {
            self.header.ancount = self.answers.len() as u16;
            let mut buf = Vec::new();
            let mut writer = BitWriter::endian(&mut buf, BigEndian);
            self.header.write(&mut writer).unwrap();
            self.question.write(&mut writer).unwrap();
            for (rtype, rdata) in &self.answers {
                // owner is a pointer to the question name
                writer.write_var::<u16>(16, 0xC00C).unwrap();
                writer.write_var::<u16>(16, *rtype).unwrap();
                writer.write_var::<u16>(16, CLASS_IN).unwrap();
                writer.write_var::<u32>(32, 300).unwrap();
                writer.write_var::<u16>(16, rdata.len() as u16).unwrap();
                writer.write_bytes(rdata).unwrap();
            }
            buf
        }
    }
}
