//! Vote payloads delivered by Top.gg webhooks.

// crates.io
use serde_json::{Map, Value};
use url::form_urlencoded;
// self
use crate::_prelude::*;

/// Failure to turn a webhook body into a [`Vote`].
#[derive(Debug, ThisError)]
pub enum PayloadError {
	/// Body is not a JSON object.
	#[error("Vote payload is not a JSON object.")]
	Malformed {
		/// Decoder failure.
		#[source]
		source: serde_json::Error,
	},
	/// Neither `bot` nor `guild` is present.
	#[error("Vote payload names neither a bot nor a guild.")]
	MissingReceiver,
	/// A required key is absent.
	#[error("Vote payload is missing the `{0}` field.")]
	MissingField(&'static str),
	/// An identifier is not a non-negative integer.
	#[error("Vote payload field `{field}` is not a valid identifier: {value}.")]
	InvalidId {
		/// Offending key.
		field: &'static str,
		/// Offending value, rendered as JSON.
		value: String,
	},
	/// `query` is present but not a string.
	#[error("Vote payload field `query` is not a string: {value}.")]
	InvalidQuery {
		/// Offending value, rendered as JSON.
		value: String,
	},
}

/// One vote notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Vote {
	/// Bot or server that received the vote.
	pub receiver_id: u64,
	/// User who voted.
	pub voter_id: u64,
	/// `true` when the vote was cast for a server rather than a bot.
	pub is_server_vote: bool,
	/// `true` for test deliveries triggered from the dashboard.
	pub is_test: bool,
	/// `true` when the vote counted double because of the weekend multiplier.
	pub is_weekend: bool,
	/// Parameters of the vote page URL, first value per key.
	pub query_params: HashMap<String, String>,
}
impl Vote {
	/// Decodes a raw JSON webhook body.
	pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
		let object = serde_json::from_slice::<Map<String, Value>>(body)
			.map_err(|source| PayloadError::Malformed { source })?;

		RawVote::from_object(object).try_into()
	}
}
impl TryFrom<Value> for Vote {
	type Error = PayloadError;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		let object = serde_json::from_value::<Map<String, Value>>(value)
			.map_err(|source| PayloadError::Malformed { source })?;

		RawVote::from_object(object).try_into()
	}
}
impl TryFrom<RawVote> for Vote {
	type Error = PayloadError;

	fn try_from(raw: RawVote) -> Result<Self, Self::Error> {
		let receiver_id = match (&raw.bot, &raw.guild) {
			(Some(bot), _) => parse_id("bot", bot)?,
			(None, Some(guild)) => parse_id("guild", guild)?,
			(None, None) => return Err(PayloadError::MissingReceiver),
		};
		let voter_id = parse_id("user", raw.user.as_ref().ok_or(PayloadError::MissingField("user"))?)?;
		let is_test = raw.kind.as_ref().ok_or(PayloadError::MissingField("type"))?.as_str() == Some("test");
		let query_params = match raw.query {
			Some(Value::String(query)) => parse_query(&query),
			Some(value) if is_truthy(&value) =>
				return Err(PayloadError::InvalidQuery { value: value.to_string() }),
			_ => HashMap::new(),
		};

		Ok(Self {
			receiver_id,
			voter_id,
			is_server_vote: raw.guild.is_some(),
			is_test,
			is_weekend: raw.is_weekend.as_ref().is_some_and(is_truthy),
			query_params,
		})
	}
}
impl Display for Vote {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "<Vote receiver_id={} voter_id={}>", self.receiver_id, self.voter_id)
	}
}

/// Keys of a vote body as they arrived; a key that was sent as `null` still counts as present.
#[derive(Clone, Debug, Default)]
pub struct RawVote {
	/// `bot`
	pub bot: Option<Value>,
	/// `guild`
	pub guild: Option<Value>,
	/// `user`
	pub user: Option<Value>,
	/// `type`
	pub kind: Option<Value>,
	/// `isWeekend`
	pub is_weekend: Option<Value>,
	/// `query`
	pub query: Option<Value>,
}
impl RawVote {
	/// Picks the vote keys out of a decoded JSON object; other keys are ignored.
	pub fn from_object(mut object: Map<String, Value>) -> Self {
		Self {
			bot: object.remove("bot"),
			guild: object.remove("guild"),
			user: object.remove("user"),
			kind: object.remove("type"),
			is_weekend: object.remove("isWeekend"),
			query: object.remove("query"),
		}
	}
}

fn parse_id(field: &'static str, value: &Value) -> Result<u64, PayloadError> {
	let parsed = match value {
		Value::Number(number) => number.as_u64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	};

	parsed.ok_or_else(|| PayloadError::InvalidId { field, value: value.to_string() })
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(flag) => *flag,
		Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
		Value::String(text) => !text.is_empty(),
		Value::Array(items) => !items.is_empty(),
		Value::Object(fields) => !fields.is_empty(),
	}
}

// Takes the query component of a (possibly relative) URL: the text after the first `?`, up to
// the fragment. Blank values are skipped and repeated keys keep their first value.
fn parse_query(url: &str) -> HashMap<String, String> {
	let without_fragment = url.split_once('#').map_or(url, |(head, _)| head);
	let Some((_, query)) = without_fragment.split_once('?') else {
		return HashMap::new();
	};
	let mut params = HashMap::new();

	for (key, value) in form_urlencoded::parse(query.as_bytes()) {
		if value.is_empty() {
			continue;
		}

		params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
	}

	params
}
