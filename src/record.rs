//! On-disk JSONL record format: one line per Meta + data pair.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The operation a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
	Put,
	Delete,
}

/// Record metadata; wire field names are the short forms the format fixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
	/// Original (unsanitized) key.
	pub k: String,
	/// Monotonically increasing version, starting at 1.
	pub v: u64,
	/// Operation this record represents.
	pub op: Op,
	/// RFC3339 UTC timestamp.
	pub ts: String,
}

/// One JSONL line: metadata plus the JSON data tree (`null` for deletes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
	#[serde(rename = "_meta")]
	pub meta: Meta,
	pub data: serde_json::Value,
}

impl Record {
	/// Build a put record. `data` must not be `Value::Null`.
	pub fn put(key: &str, version: u64, data: serde_json::Value, ts: String) -> Self {
		Record { meta: Meta { k: key.to_string(), v: version, op: Op::Put, ts }, data }
	}

	/// Build a delete (tombstone) record.
	pub fn delete(key: &str, version: u64, ts: String) -> Self {
		Record {
			meta: Meta { k: key.to_string(), v: version, op: Op::Delete, ts },
			data: serde_json::Value::Null,
		}
	}

	/// Validate structural invariants: non-empty key, v>=1, and that `data`
	/// agrees with `op` (put carries a value, delete carries null).
	pub fn validate(&self) -> Result<(), Error> {
		if self.meta.k.is_empty() {
			return Err(Error::CorruptedData { message: "record key is empty".into() });
		}
		if self.meta.v == 0 {
			return Err(Error::CorruptedData { message: "record version must be >= 1".into() });
		}
		match self.meta.op {
			Op::Put if self.data.is_null() => {
				return Err(Error::CorruptedData {
					message: "put record must carry non-null data".into(),
				});
			}
			Op::Delete if !self.data.is_null() => {
				return Err(Error::CorruptedData {
					message: "delete record must carry null data".into(),
				});
			}
			_ => {}
		}
		Ok(())
	}

	/// Encode as a single compact JSON line with a trailing newline.
	pub fn encode(&self) -> Result<Vec<u8>, Error> {
		self.validate()?;
		let mut bytes = serde_json::to_vec(self)?;
		bytes.push(b'\n');
		Ok(bytes)
	}

	/// Decode and validate one line (trailing newline/whitespace tolerated).
	pub fn decode(line: &[u8]) -> Result<Self, Error> {
		let trimmed = trim_trailing_whitespace(line);
		let record: Record = serde_json::from_slice(trimmed)?;
		record.validate()?;
		Ok(record)
	}
}

fn trim_trailing_whitespace(line: &[u8]) -> &[u8] {
	let mut end = line.len();
	while end > 0 && (line[end - 1] as char).is_whitespace() {
		end -= 1;
	}
	&line[..end]
}

/// Current UTC time as RFC3339, e.g. `2026-08-01T12:34:56.789012345Z`.
pub fn now_rfc3339() -> String {
	use std::time::{SystemTime, UNIX_EPOCH};
	let dur = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
	format_rfc3339_utc(dur.as_secs(), dur.subsec_nanos())
}

/// Format a Unix timestamp (seconds + nanos) as RFC3339 UTC without pulling
/// in a calendar dependency, using the civil-from-days algorithm.
fn format_rfc3339_utc(secs: u64, nanos: u32) -> String {
	let days = (secs / 86_400) as i64;
	let rem = secs % 86_400;
	let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);

	let z = days + 719_468;
	let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
	let doe = (z - era * 146_097) as u64;
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let day = doy - (153 * mp + 2) / 5 + 1;
	let month = if mp < 10 { mp + 3 } else { mp - 9 };
	let year = if month <= 2 { y + 1 } else { y };

	format!(
		"{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}Z",
		year, month, day, hour, minute, second, nanos
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn encode_decode_round_trip_put() {
		let rec = Record::put("server", 1, json!({"host": "localhost"}), now_rfc3339());
		let bytes = rec.encode().unwrap();
		assert!(bytes.ends_with(b"\n"));
		assert!(!bytes.windows(2).any(|w| w == b"  "), "compact encoding has no extra spaces");

		let decoded = Record::decode(&bytes).unwrap();
		assert_eq!(decoded.meta.k, "server");
		assert_eq!(decoded.meta.v, 1);
		assert_eq!(decoded.data, json!({"host": "localhost"}));
	}

	#[test]
	fn encode_decode_round_trip_delete() {
		let rec = Record::delete("server", 2, now_rfc3339());
		let bytes = rec.encode().unwrap();
		let decoded = Record::decode(&bytes).unwrap();
		assert_eq!(decoded.meta.op, Op::Delete);
		assert!(decoded.data.is_null());
	}

	#[test]
	fn wire_format_uses_short_field_names() {
		let rec = Record::put("k", 1, json!({"a": 1}), "2026-08-01T00:00:00.000000000Z".into());
		let encoded = String::from_utf8(rec.encode().unwrap()).unwrap();
		assert!(encoded.contains("\"_meta\""));
		assert!(encoded.contains("\"k\":\"k\""));
		assert!(encoded.contains("\"v\":1"));
		assert!(encoded.contains("\"op\":\"put\""));
		assert!(encoded.contains("\"ts\":"));
		assert!(encoded.contains("\"data\":"));
	}

	#[test]
	fn put_with_null_data_fails_validation() {
		let rec = Record {
			meta: Meta { k: "k".into(), v: 1, op: Op::Put, ts: now_rfc3339() },
			data: serde_json::Value::Null,
		};
		assert!(rec.validate().is_err());
	}

	#[test]
	fn delete_with_non_null_data_fails_validation() {
		let rec = Record {
			meta: Meta { k: "k".into(), v: 1, op: Op::Delete, ts: now_rfc3339() },
			data: json!({"a": 1}),
		};
		assert!(rec.validate().is_err());
	}

	#[test]
	fn zero_version_fails_validation() {
		let rec = Record {
			meta: Meta { k: "k".into(), v: 0, op: Op::Put, ts: now_rfc3339() },
			data: json!({}),
		};
		assert!(rec.validate().is_err());
	}

	#[test]
	fn malformed_line_fails_to_decode() {
		assert!(Record::decode(b"not json\n").is_err());
	}

	#[test]
	fn decode_tolerates_trailing_whitespace() {
		let rec = Record::put("k", 1, json!({}), now_rfc3339());
		let mut bytes = rec.encode().unwrap();
		bytes.push(b'\n');
		bytes.push(b' ');
		assert!(Record::decode(&bytes).is_ok());
	}
}
