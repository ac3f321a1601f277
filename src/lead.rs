use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use std::fmt;
use std::io::Read;
use strum_macros::Display;

use crate::error::{Error, Result};
use crate::utils::parse_string;

pub const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
pub const LEAD_SIZE: usize = 96;

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive, Display)]
pub enum PackageType {
    Binary = 0,
    Source = 1,
}

/// The 96-byte package lead. Everything interesting moved into the
/// headers long ago; the lead is only validated, never consulted.
pub struct Lead {
    pub magic: [u8; 4],
    pub major: u8,
    pub minor: u8,
    pub package_type: PackageType,
    pub archnum: u16,
    pub name: [u8; 66],
    pub osnum: u16,
    pub signature_type: u16,
    pub reserved: [u8; 16],
}

impl Lead {
    pub fn read<R: Read>(fh: &mut R) -> Result<Self> {
        let mut data = [0_u8; LEAD_SIZE];
        fh.read_exact(&mut data)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8; LEAD_SIZE]) -> Result<Self> {
        let mut magic = [0_u8; 4];
        magic.copy_from_slice(&data[0..4]);
        if magic != LEAD_MAGIC {
            return Err(Error::Structural("no rpm magic found".to_string()));
        }
        let major = data[4];
        let minor = data[5];
        if !(major == 3 || major == 4) || minor != 0 {
            return Err(Error::Structural(format!(
                "unsupported rpm lead version {}.{}",
                major, minor
            )));
        }
        let rpm_type = u16::from_be_bytes([data[6], data[7]]);
        let package_type = PackageType::from_u16(rpm_type)
            .ok_or_else(|| Error::Structural(format!("bad rpm type {}", rpm_type)))?;
        let archnum = u16::from_be_bytes([data[8], data[9]]);
        let mut name = [0_u8; 66];
        name.copy_from_slice(&data[10..76]);
        let osnum = u16::from_be_bytes([data[76], data[77]]);
        if !matches!(osnum, 1 | 21 | 255 | 256) {
            return Err(Error::Structural(format!("bad os number {}", osnum)));
        }
        let signature_type = u16::from_be_bytes([data[78], data[79]]);
        if signature_type != 5 {
            return Err(Error::Structural(format!(
                "bad signature type {}",
                signature_type
            )));
        }
        let mut reserved = [0_u8; 16];
        reserved.copy_from_slice(&data[80..96]);

        Ok(Lead {
            magic,
            major,
            minor,
            package_type,
            archnum,
            name,
            osnum,
            signature_type,
            reserved,
        })
    }

    pub fn is_source(&self) -> bool {
        self.package_type == PackageType::Source
    }
}

impl fmt::Display for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic: {:?}", self.magic)?;
        writeln!(f, "major: {}", self.major)?;
        writeln!(f, "minor: {}", self.minor)?;
        writeln!(f, "package_type: {}", self.package_type)?;
        writeln!(f, "archnum: {}", self.archnum)?;
        writeln!(f, "name: {}", parse_string(&self.name))?;
        writeln!(f, "osnum: {}", self.osnum)?;
        writeln!(f, "signature_type: {}", self.signature_type)
    }
}

impl fmt::Debug for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic: {:?}", self.magic)?;
        writeln!(f, "major: {}", self.major)?;
        writeln!(f, "minor: {}", self.minor)?;
        writeln!(f, "package_type: {}", self.package_type)?;
        writeln!(f, "archnum: {}", self.archnum)?;
        writeln!(f, "name: {:?}", &&self.name[..])?;
        writeln!(f, "osnum: {}", self.osnum)?;
        writeln!(f, "signature_type: {}", self.signature_type)?;
        writeln!(f, "reserved: {:?}", self.reserved)
    }
}

impl Default for Lead {
    fn default() -> Self {
        Lead {
            magic: LEAD_MAGIC,
            major: 4,
            minor: 0,
            package_type: PackageType::Binary,
            archnum: 1,
            name: [0; 66],
            osnum: 1,
            signature_type: 5,
            reserved: [0; 16],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead_bytes() -> [u8; LEAD_SIZE] {
        let mut data = [0_u8; LEAD_SIZE];
        data[0..4].copy_from_slice(&LEAD_MAGIC);
        data[4] = 3;
        data[5] = 0;
        data[6..8].copy_from_slice(&0_u16.to_be_bytes());
        data[8..10].copy_from_slice(&1_u16.to_be_bytes());
        data[10..19].copy_from_slice(b"coreutils");
        data[76..78].copy_from_slice(&1_u16.to_be_bytes());
        data[78..80].copy_from_slice(&5_u16.to_be_bytes());
        data
    }

    #[test]
    fn test_parse_lead() {
        let lead = Lead::parse(&sample_lead_bytes()).unwrap();
        assert_eq!(lead.major, 3);
        assert_eq!(lead.package_type, PackageType::Binary);
        assert!(!lead.is_source());
        assert_eq!(parse_string(&lead.name), "coreutils");
    }

    #[test]
    fn test_reject_bad_magic() {
        let mut data = sample_lead_bytes();
        data[0] = 0;
        assert!(Lead::parse(&data).is_err());
    }

    #[test]
    fn test_reject_bad_version() {
        let mut data = sample_lead_bytes();
        data[4] = 5;
        assert!(Lead::parse(&data).is_err());
        let mut data = sample_lead_bytes();
        data[5] = 1;
        assert!(Lead::parse(&data).is_err());
    }

    #[test]
    fn test_reject_bad_sigtype() {
        let mut data = sample_lead_bytes();
        data[78..80].copy_from_slice(&1_u16.to_be_bytes());
        assert!(Lead::parse(&data).is_err());
    }

    #[test]
    fn test_source_lead() {
        let mut data = sample_lead_bytes();
        data[6..8].copy_from_slice(&1_u16.to_be_bytes());
        let lead = Lead::parse(&data).unwrap();
        assert!(lead.is_source());
    }
}
