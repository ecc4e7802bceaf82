use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use crate::error::DnsError;

/// Longest encoded domain name
pub const MAX_NAME_LEN: usize = 255;
/// Longest single label
pub const MAX_LABEL_LEN: usize = 63;

pub trait PacketComponent {
    fn write<E: Endianness>(&self, writer: &mut BitWriter<&mut Vec<u8>, E>)
    -> Result<(), DnsError>;
    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), DnsError>;

    /// Read an uncompressed name as a sequence of labels
    fn read_labels<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
    ) -> Result<Vec<String>, DnsError> {
        let mut labels = Vec::new();
        let mut total = 0;
        loop {
            let label_len = reader.read_var::<u8>(8)?;
            if label_len == 0 {
                break;
            }
            if label_len as usize > MAX_LABEL_LEN {
                return Err(DnsError::InvalidLabelLength(label_len));
            }
            total += label_len as usize + 1;
            if total > MAX_NAME_LEN {
                return Err(DnsError::NameTooLong);
            }
            let buf = reader.read_to_vec(label_len as usize)?;
            labels.push(String::from_utf8_lossy(&buf).into_owned());
        }

        Ok(labels)
    }

    /// Write labels followed by the root label
    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), DnsError> {
        for label in labels {
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;

        Ok(())
    }
}

/// Split a presentation-format name into checked labels.
///
/// A single trailing dot is accepted; empty inner labels are not.
pub fn name_to_labels(name: &str) -> Result<Vec<String>, DnsError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return Ok(Vec::new());
    }

    let mut total = 1;
    let mut labels = Vec::new();
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(DnsError::InvalidLabelLength(label.len().min(255) as u8));
        }
        total += label.len() + 1;
        if total > MAX_NAME_LEN {
            return Err(DnsError::NameTooLong);
        }
        labels.push(label.to_string());
    }
    Ok(labels)
}
