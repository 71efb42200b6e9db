//! Format specifiers for f-string interpolation sites.
//!
//! The grammar is `[[fill]align][sign][#][0][width][.precision][type]`,
//! scanned right to left: the type letter is at the end, then precision,
//! width, flags, and finally the optional fill character in front of the
//! alignment. Right-to-left scanning keeps a digit fill like `0` from
//! being confused with the width.

/// A parsed format specifier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FormatSpec {
    pub fill: Option<char>,
    pub align: Option<char>,
    pub sign: Option<char>,
    pub alternate: bool,
    pub zero_pad: bool,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub kind: Option<char>,
}

const VALID_ALIGN: &[char] = &['<', '>', '=', '^'];
const VALID_SIGN: &[char] = &['+', '-', ' '];
const VALID_TYPE: &[char] = &['b', 'c', 'd', 'o', 'x', 'X', 'n', 'e', 'E', 'f', 'F', 'g', 'G', '%', 's'];

impl FormatSpec {
    pub fn is_float(&self) -> bool {
        matches!(self.kind, Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | 'n' | '%'))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, Some('b' | 'c' | 'd' | 'o' | 'x' | 'X' | 'n'))
    }

    pub fn is_undefined(&self) -> bool {
        self.kind.is_none()
    }

    /// Parses a specifier, scanning right to left.
    pub fn parse(spec: &str) -> FormatSpec {
        let chars: Vec<char> = spec.chars().collect();
        let mut result = FormatSpec::default();
        let mut i = chars.len() as isize - 1;

        // Type letter.
        if i >= 0 && VALID_TYPE.contains(&chars[i as usize]) {
            result.kind = Some(chars[i as usize]);
            i -= 1;
        }

        // Precision: digits preceded by '.'.
        let digits_end = i;
        let mut digits_start = i;
        while digits_start >= 0 && chars[digits_start as usize].is_ascii_digit() {
            digits_start -= 1;
        }
        if digits_start >= 0 && chars[digits_start as usize] == '.' && digits_start < digits_end {
            let text: String = chars[(digits_start + 1) as usize..=digits_end as usize].iter().collect();
            result.precision = text.parse().ok();
            i = digits_start - 1;
        }

        // Width, a leading zero doubling as the pad flag.
        let width_end = i;
        let mut width_start = i;
        while width_start >= 0 && chars[width_start as usize].is_ascii_digit() {
            width_start -= 1;
        }
        if width_start < width_end {
            let text: String = chars[(width_start + 1) as usize..=width_end as usize].iter().collect();
            if !text.is_empty() {
                result.width = text.parse().ok();
                if text.starts_with('0') {
                    result.zero_pad = true;
                }
                i = width_start;
            }
        }

        // '#' alternate form.
        if i >= 0 && chars[i as usize] == '#' {
            result.alternate = true;
            i -= 1;
        }

        // Sign.
        if i >= 0 && VALID_SIGN.contains(&chars[i as usize]) {
            result.sign = Some(chars[i as usize]);
            i -= 1;
        }

        // Alignment, optionally preceded by a fill character.
        if i >= 0 && VALID_ALIGN.contains(&chars[i as usize]) {
            result.align = Some(chars[i as usize]);
            i -= 1;
            if i >= 0 {
                result.fill = Some(chars[i as usize]);
            }
        }

        result
    }

    fn pad(&self, text: String, numeric: bool) -> String {
        let Some(width) = self.width else { return text };
        if text.len() >= width {
            return text;
        }
        let fill = self.fill.unwrap_or(if self.zero_pad && numeric { '0' } else { ' ' });
        let missing = width - text.len();
        let align = self.align.unwrap_or(if self.zero_pad && numeric {
            '='
        } else if numeric {
            '>'
        } else {
            '<'
        });
        match align {
            '<' => format!("{}{}", text, fill.to_string().repeat(missing)),
            '^' => {
                let left = missing / 2;
                let right = missing - left;
                format!("{}{}{}", fill.to_string().repeat(left), text, fill.to_string().repeat(right))
            }
            '=' => {
                // Pad after the sign.
                if let Some(rest) = text.strip_prefix(['+', '-']) {
                    format!("{}{}{}", &text[..1], fill.to_string().repeat(missing), rest)
                } else {
                    format!("{}{}", fill.to_string().repeat(missing), text)
                }
            }
            _ => format!("{}{}", fill.to_string().repeat(missing), text),
        }
    }

    fn signed(&self, text: String, negative: bool) -> String {
        if negative {
            return text;
        }
        match self.sign {
            Some('+') => format!("+{}", text),
            Some(' ') => format!(" {}", text),
            _ => text,
        }
    }

    pub fn apply_int(&self, value: i64) -> String {
        let magnitude = value.unsigned_abs();
        let body = match self.kind {
            Some('b') => format!("{:b}", magnitude),
            Some('o') => format!("{:o}", magnitude),
            Some('x') => format!("{:x}", magnitude),
            Some('X') => format!("{:X}", magnitude),
            Some('c') => char::from_u32(value as u32).map(String::from).unwrap_or_default(),
            Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return self.apply_float(value as f64),
            _ => format!("{}", magnitude),
        };
        let prefixed = if self.alternate {
            match self.kind {
                Some('b') => format!("0b{}", body),
                Some('o') => format!("0o{}", body),
                Some('x') => format!("0x{}", body),
                Some('X') => format!("0X{}", body),
                _ => body,
            }
        } else {
            body
        };
        let with_sign = if value < 0 {
            format!("-{}", prefixed)
        } else {
            self.signed(prefixed, false)
        };
        self.pad(with_sign, true)
    }

    pub fn apply_float(&self, value: f64) -> String {
        let precision = self.precision.unwrap_or(6);
        let body = match self.kind {
            Some('e') => format!("{:.*e}", precision, value),
            Some('E') => format!("{:.*E}", precision, value),
            Some('%') => format!("{:.*}%", precision, value * 100.0),
            Some('g' | 'G') | None if self.precision.is_none() => format!("{}", value),
            _ => format!("{:.*}", precision, value),
        };
        let with_sign = if value < 0.0 { body } else { self.signed(body, false) };
        self.pad(with_sign, true)
    }

    pub fn apply_str(&self, value: &str) -> String {
        let mut text = value.to_string();
        if let Some(precision) = self.precision {
            text.truncate(precision);
        }
        self.pad(text, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_only() {
        let spec = FormatSpec::parse("x");
        assert_eq!(spec.kind, Some('x'));
        assert!(spec.is_integer());
    }

    #[test]
    fn parses_width_and_precision() {
        let spec = FormatSpec::parse("10.3f");
        assert_eq!(spec.width, Some(10));
        assert_eq!(spec.precision, Some(3));
        assert_eq!(spec.kind, Some('f'));
        assert!(spec.is_float());
    }

    #[test]
    fn parses_fill_and_align() {
        let spec = FormatSpec::parse("*^8");
        assert_eq!(spec.fill, Some('*'));
        assert_eq!(spec.align, Some('^'));
        assert_eq!(spec.width, Some(8));
    }

    #[test]
    fn zero_width_sets_pad_flag() {
        let spec = FormatSpec::parse("08d");
        assert!(spec.zero_pad);
        assert_eq!(spec.width, Some(8));
    }

    #[test]
    fn parses_sign_and_alternate() {
        let spec = FormatSpec::parse("+#x");
        assert_eq!(spec.sign, Some('+'));
        assert!(spec.alternate);
        assert_eq!(spec.kind, Some('x'));
    }

    #[test]
    fn empty_spec_is_undefined() {
        let spec = FormatSpec::parse("");
        assert!(spec.is_undefined());
        assert_eq!(spec, FormatSpec::default());
    }

    #[test]
    fn apply_int_hex_with_prefix() {
        let spec = FormatSpec::parse("#x");
        assert_eq!(spec.apply_int(255), "0xff");
    }

    #[test]
    fn apply_int_zero_padded() {
        let spec = FormatSpec::parse("05d");
        assert_eq!(spec.apply_int(42), "00042");
    }

    #[test]
    fn apply_float_precision() {
        let spec = FormatSpec::parse(".2f");
        assert_eq!(spec.apply_float(3.14159), "3.14");
    }

    #[test]
    fn apply_str_centered() {
        let spec = FormatSpec::parse("^7");
        assert_eq!(spec.apply_str("abc"), "  abc  ");
    }

    #[test]
    fn apply_str_truncates_to_precision() {
        let spec = FormatSpec::parse(".3");
        assert_eq!(spec.apply_str("abcdef"), "abc");
    }

    #[test]
    fn negative_int_pads_after_sign() {
        let spec = FormatSpec::parse("05d");
        assert_eq!(spec.apply_int(-42), "-0042");
    }
}
