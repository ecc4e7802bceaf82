use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::common::{PacketComponent, name_to_labels};
use super::{CLASS_IN, TYPE_TXT};
use crate::error::DnsError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsQuestion {
    pub labels: Vec<String>,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    /// TXT/IN question for `name`
    pub fn txt(name: &str) -> Result<Self, DnsError> {
        Ok(Self {
            labels: name_to_labels(name)?,
            qtype: TYPE_TXT,
            qclass: CLASS_IN,
        })
    }
}

impl PacketComponent for DnsQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), DnsError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype)?;
        writer.write_var::<u16>(16, self.qclass)?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), DnsError> {
        let labels = self.read_labels(reader)?;
        let qtype = reader.read_var::<u16>(16)?;
        let qclass = reader.read_var::<u16>(16)?;
        *self = DnsQuestion {
            labels,
            qtype,
            qclass,
        };
        Ok(())
    }
}
