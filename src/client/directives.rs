//! Parsing of prefixed directive attributes such as `live:model.defer="email"` or `live:click="save(1, 'a')"`.

use super::dom::Dom;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
	/// `model` in `live:model.lazy`.
	pub kind: String,
	/// `["lazy"]` in `live:model.lazy`.
	pub modifiers: Vec<String>,
	/// The full attribute name.
	pub raw_name: String,
	pub value: String,
}

impl Directive {
	/// Parses one attribute, returning `None` if it isn't a directive.
	#[must_use]
	pub fn parse(prefix: &str, name: &str, value: &str) -> Option<Self> {
		let mut parts = name.strip_prefix(prefix)?.split('.');
		let kind = parts.next().filter(|kind| !kind.is_empty())?.to_owned();
		Some(Self {
			kind,
			modifiers: parts.map(ToOwned::to_owned).collect(),
			raw_name: name.to_owned(),
			value: value.to_owned(),
		})
	}

	#[must_use]
	pub fn has_modifier(&self, modifier: &str) -> bool {
		self.modifiers.iter().any(|existing| existing == modifier)
	}

	/// The first `150ms`/`2s` modifier in milliseconds, or `default`.
	#[must_use]
	pub fn duration_or(&self, default: u64) -> u64 {
		self.modifiers
			.iter()
			.find_map(|modifier| {
				if let Some(ms) = modifier.strip_suffix("ms") {
					ms.parse().ok()
				} else {
					modifier.strip_suffix('s')?.parse::<u64>().ok().map(|s| s * 1000)
				}
			})
			.unwrap_or(default)
	}

	/// Splits `method(arg, …)` into the method name and JSON-ish arguments.
	///
	/// Single-quoted strings are accepted; anything that isn't a JSON literal is passed as a string.
	#[must_use]
	pub fn method_and_params(&self) -> (String, Vec<Value>) {
		parse_call(self.value.trim())
	}
}

fn parse_call(call: &str) -> (String, Vec<Value>) {
	let open = match call.find('(') {
		Some(open) if call.ends_with(')') => open,
		_ => return (call.to_owned(), Vec::new()),
	};
	let method = call[..open].trim().to_owned();
	let inner = &call[open + 1..call.len() - 1];
	(method, split_arguments(inner).into_iter().map(parse_argument).collect())
}

fn split_arguments(inner: &str) -> Vec<&str> {
	let mut arguments = Vec::new();
	let mut depth = 0_i32;
	let mut quote: Option<char> = None;
	let mut escaped = false;
	let mut start = 0;
	for (i, c) in inner.char_indices() {
		if let Some(open) = quote {
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == open {
				quote = None;
			}
			continue;
		}
		match c {
			'\'' | '"' => quote = Some(c),
			'[' | '{' | '(' => depth += 1,
			']' | '}' | ')' => depth -= 1,
			',' if depth == 0 => {
				arguments.push(inner[start..i].trim());
				start = i + 1;
			}
			_ => (),
		}
	}
	let last = inner[start..].trim();
	if !last.is_empty() || !arguments.is_empty() {
		arguments.push(last);
	}
	arguments
}

fn parse_argument(argument: &str) -> Value {
	if let Some(single) = argument.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')) {
		return Value::String(single.replace("\\'", "'"));
	}
	serde_json::from_str(argument).unwrap_or_else(|_| Value::String(argument.to_owned()))
}

/// All directives on one element, in attribute order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives(Vec<Directive>);

impl Directives {
	pub fn of<D: Dom + ?Sized>(dom: &D, node: &D::Node, prefix: &str) -> Self {
		Self(dom.attributes(node).into_iter().filter_map(|(name, value)| Directive::parse(prefix, &name, &value)).collect())
	}

	#[must_use]
	pub fn has(&self, kind: &str) -> bool {
		self.0.iter().any(|directive| directive.kind == kind)
	}

	#[must_use]
	pub fn get(&self, kind: &str) -> Option<&Directive> {
		self.0.iter().find(|directive| directive.kind == kind)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Directive> {
		self.0.iter()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn kinds_and_modifiers() {
		let directive = Directive::parse("live:", "live:model.debounce.300ms", "email").unwrap();
		assert_eq!(directive.kind, "model");
		assert!(directive.has_modifier("debounce"));
		assert_eq!(directive.duration_or(150), 300);
		assert_eq!(Directive::parse("live:", "live:poll.2s", "").unwrap().duration_or(5), 2000);
		assert_eq!(Directive::parse("live:", "live:poll", "").unwrap().duration_or(2000), 2000);
		assert!(Directive::parse("live:", "class", "x").is_none());
		assert!(Directive::parse("live:", "live:", "x").is_none());
	}

	#[test]
	fn calls() {
		let directive = Directive::parse("live:", "live:click", "save(1, 'a, b', [1, 2], {\"k\": true}, other)").unwrap();
		assert_eq!(directive.method_and_params(), ("save".to_owned(), vec![json!(1), json!("a, b"), json!([1, 2]), json!({"k": true}), json!("other")]));
		assert_eq!(parse_call("refresh"), ("refresh".to_owned(), vec![]));
		assert_eq!(parse_call("go()"), ("go".to_owned(), vec![]));
	}
}
