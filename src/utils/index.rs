/// Format a base-unit amount in main units with exactly `decimals` fractional digits.
pub fn format_token_amount(amount: u128, decimals: u32) -> String {
	if decimals == 0 {
		return amount.to_string();
	}
	let digits = format!("{:0>width$}", amount, width = decimals as usize + 1);
	let (whole, fraction) = digits.split_at(digits.len() - decimals as usize);
	format!("{}.{}", whole, fraction)
}

/// Parse a main-unit decimal string into base units. Returns `None` on malformed input, on more
/// fractional digits than `decimals`, or on overflow.
pub fn parse_token_amount(value: &str, decimals: u32) -> Option<u128> {
	let value = value.trim();
	let (whole, fraction) = match value.split_once('.') {
		Some((whole, fraction)) => (whole, fraction),
		None => (value, ""),
	};
	if whole.is_empty() && fraction.is_empty() {
		return None;
	}
	if fraction.len() > decimals as usize
		|| !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
	{
		return None;
	}

	let scale = 10u128.checked_pow(decimals)?;
	let whole = if whole.is_empty() { 0 } else { whole.parse::<u128>().ok()? };
	let fraction = if fraction.is_empty() {
		0
	} else {
		let padded = format!("{:0<width$}", fraction, width = decimals as usize);
		padded.parse::<u128>().ok()?
	};
	whole.checked_mul(scale)?.checked_add(fraction)
}
