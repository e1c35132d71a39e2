//! Sets of gRPC status codes considered healthy.
//!
//! Codes are written the way load balancers accept them: a comma separated
//! list of single codes and inclusive ranges, e.g. `"0-99"` or `"0,3,5-7"`.
//! The set is normalized (sorted, overlapping and adjacent ranges merged) so
//! equal sets always render to the same string.

use crate::{Error, Result};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};
use tonic::Code;

/// Highest code accepted in a specification.
pub const MAX_CODE: i32 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HealthyCodes {
    ranges: Vec<(i32, i32)>,
}

impl HealthyCodes {
    /// Codes a live, request-processing server answers with. Application
    /// level rejections count as alive; infrastructure failures do not.
    pub fn liveness() -> Self {
        Self::from_codes(&[
            Code::Ok,
            Code::InvalidArgument,
            Code::NotFound,
            Code::AlreadyExists,
            Code::PermissionDenied,
            Code::FailedPrecondition,
            Code::OutOfRange,
            Code::Unimplemented,
            Code::Unauthenticated,
        ])
    }

    /// Every code from 0 through 99.
    pub fn permissive() -> Self {
        Self {
            ranges: vec![(0, MAX_CODE)],
        }
    }

    pub fn from_codes(codes: &[Code]) -> Self {
        let ranges = codes.iter().map(|c| (*c as i32, *c as i32)).collect();
        Self::normalized(ranges)
    }

    pub fn contains(&self, code: i32) -> bool {
        self.ranges
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&code))
    }

    pub fn contains_code(&self, code: Code) -> bool {
        self.contains(code as i32)
    }

    fn normalized(mut ranges: Vec<(i32, i32)>) -> Self {
        ranges.sort_unstable();
        let mut merged: Vec<(i32, i32)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }
}

impl Default for HealthyCodes {
    fn default() -> Self {
        Self::liveness()
    }
}

fn parse_code(spec: &str, raw: &str) -> Result<i32> {
    let code: i32 = raw.trim().parse().map_err(|_| Error::InvalidHealthCodes {
        spec: spec.to_string(),
        reason: format!("`{}` is not a number", raw.trim()),
    })?;
    if !(0..=MAX_CODE).contains(&code) {
        return Err(Error::InvalidHealthCodes {
            spec: spec.to_string(),
            reason: format!("{code} is outside 0-{MAX_CODE}"),
        });
    }
    Ok(code)
}

impl FromStr for HealthyCodes {
    type Err = Error;

    fn from_str(spec: &str) -> Result<Self> {
        if spec.trim().is_empty() {
            return Err(Error::InvalidHealthCodes {
                spec: spec.to_string(),
                reason: "empty specification".to_string(),
            });
        }

        let mut ranges = Vec::new();
        for part in spec.split(',') {
            let range = match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse_code(spec, start)?, parse_code(spec, end)?);
                    if start > end {
                        return Err(Error::InvalidHealthCodes {
                            spec: spec.to_string(),
                            reason: format!("range {start}-{end} is reversed"),
                        });
                    }
                    (start, end)
                }
                None => {
                    let code = parse_code(spec, part)?;
                    (code, code)
                }
            };
            ranges.push(range);
        }

        Ok(Self::normalized(ranges))
    }
}

impl fmt::Display for HealthyCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for HealthyCodes {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HealthyCodes> for String {
    fn from(value: HealthyCodes) -> Self {
        value.to_string()
    }
}
