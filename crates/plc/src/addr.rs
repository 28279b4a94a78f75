use autorc_protocol::CoreError;

/// A parsed tag address. Devices write through [`TagAddress::Word`]
/// (`HR:<register>:WORD`); notifications read through [`TagAddress::Bit`]
/// (`<register>/<bit>`, register in hex `0x..` or decimal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAddress {
    Word { register: u16 },
    Bit { register: u16, bit: u8 },
}

impl TagAddress {
    pub fn parse_word(raw: &str) -> Result<Self, CoreError> {
        let mut parts = raw.split(':');
        let (Some(kind), Some(register), Some(width), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::ConfigInvalid(format!("malformed word tag address: {raw}")));
        };
        if !kind.eq_ignore_ascii_case("HR") || !width.eq_ignore_ascii_case("WORD") {
            return Err(CoreError::ConfigInvalid(format!("unsupported word tag address: {raw}")));
        }
        let register = parse_register(register)
            .ok_or_else(|| CoreError::ConfigInvalid(format!("invalid register in: {raw}")))?;
        Ok(Self::Word { register })
    }

    pub fn parse_bit(raw: &str) -> Result<Self, CoreError> {
        let (register, bit) = raw
            .split_once('/')
            .ok_or_else(|| CoreError::ConfigInvalid(format!("malformed bit tag address: {raw}")))?;
        let register =
            parse_register(register).ok_or_else(|| CoreError::ConfigInvalid(format!("invalid register in: {raw}")))?;
        let bit: u8 = bit
            .parse()
            .map_err(|_| CoreError::ConfigInvalid(format!("invalid bit index in: {raw}")))?;
        if bit >= 16 {
            return Err(CoreError::ConfigInvalid(format!("bit index out of range (0..16): {raw}")));
        }
        Ok(Self::Bit { register, bit })
    }
}

fn parse_register(raw: &str) -> Option<u16> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_word_address() {
        let addr = TagAddress::parse_word("HR:7:WORD").unwrap();
        assert_eq!(addr, TagAddress::Word { register: 7 });
    }

    #[test]
    fn parses_hex_bit_address() {
        let addr = TagAddress::parse_bit("0x1/2").unwrap();
        assert_eq!(addr, TagAddress::Bit { register: 1, bit: 2 });
    }

    #[test]
    fn rejects_out_of_range_bit() {
        assert!(TagAddress::parse_bit("0x1/16").is_err());
    }

    #[test]
    fn rejects_malformed_word_address() {
        assert!(TagAddress::parse_word("HR:7").is_err());
        assert!(TagAddress::parse_word("COIL:7:WORD").is_err());
    }
}
