/// Mask extracting `nal_unit_type` from the NAL header byte.
pub const NAL_TYPE_MASK: u8 = 0x1F;

/// First NAL unit type carrying non-VCL data (SEI).
pub const FIRST_NON_VCL_TYPE: u8 = 0x06;

/// NAL unit types relevant to access-unit framing (ITU-T H.264 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdr = 1,
    /// Coded slice data partition A
    PartitionA = 2,
    /// Coded slice data partition B
    PartitionB = 3,
    /// Coded slice data partition C
    PartitionC = 4,
    /// Coded slice of an IDR picture
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    AccessUnitDelimiter = 9,
}

impl NalUnitType {
    /// Extract the NAL unit type from a NAL header byte.
    ///
    /// Returns `None` for types outside the `0x01..=0x09` range the framer
    /// considers (unspecified, end-of-sequence, filler, and reserved types).
    pub fn from_header(header: u8) -> Option<Self> {
        match header & NAL_TYPE_MASK {
            1 => Some(NalUnitType::NonIdr),
            2 => Some(NalUnitType::PartitionA),
            3 => Some(NalUnitType::PartitionB),
            4 => Some(NalUnitType::PartitionC),
            5 => Some(NalUnitType::Idr),
            6 => Some(NalUnitType::Sei),
            7 => Some(NalUnitType::Sps),
            8 => Some(NalUnitType::Pps),
            9 => Some(NalUnitType::AccessUnitDelimiter),
            _ => None,
        }
    }

    /// Whether this type carries VCL (coded slice) data.
    pub fn is_vcl(self) -> bool {
        (self as u8) < FIRST_NON_VCL_TYPE
    }
}
