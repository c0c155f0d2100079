use regex::Regex;
use std::sync::OnceLock;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("static regex"))
}

const UNITS: [&str; 20] = [
    "zero", "um", "dois", "três", "quatro", "cinco", "seis", "sete", "oito", "nove", "dez",
    "onze", "doze", "treze", "quatorze", "quinze", "dezesseis", "dezessete", "dezoito",
    "dezenove",
];

const TENS: [&str; 10] = [
    "", "", "vinte", "trinta", "quarenta", "cinquenta", "sessenta", "setenta", "oitenta",
    "noventa",
];

const HUNDREDS: [&str; 10] = [
    "", "cento", "duzentos", "trezentos", "quatrocentos", "quinhentos", "seiscentos",
    "setecentos", "oitocentos", "novecentos",
];

fn spell_below_thousand(n: u64, parts: &mut Vec<String>) {
    debug_assert!(n < 1000);
    if n == 0 {
        return;
    }
    if n == 100 {
        parts.push("cem".to_string());
        return;
    }

    let hundreds = (n / 100) as usize;
    let remainder = n % 100;
    if hundreds > 0 {
        parts.push(HUNDREDS[hundreds].to_string());
    }
    if remainder == 0 {
        return;
    }
    if hundreds > 0 {
        parts.push("e".to_string());
    }

    if remainder < 20 {
        parts.push(UNITS[remainder as usize].to_string());
    } else {
        parts.push(TENS[(remainder / 10) as usize].to_string());
        let unit = remainder % 10;
        if unit > 0 {
            parts.push("e".to_string());
            parts.push(UNITS[unit as usize].to_string());
        }
    }
}

fn scale_word(index: usize, amount: u64) -> Option<&'static str> {
    match (index, amount) {
        (1, _) => Some("mil"),
        (2, 1) => Some("milhão"),
        (2, _) => Some("milhões"),
        (3, 1) => Some("bilhão"),
        (3, _) => Some("bilhões"),
        _ => None,
    }
}

/// Spells a non-negative integer in Brazilian Portuguese. Values beyond the
/// supported scale (hundreds of billions) return `None` and the caller
/// keeps the numeral verbatim.
pub fn spell_integer(n: u64) -> Option<String> {
    if n == 0 {
        return Some("zero".to_string());
    }

    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }
    if groups.len() > 4 {
        return None;
    }

    let mut parts: Vec<String> = Vec::new();
    for (index, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        if !parts.is_empty() {
            parts.push("e".to_string());
        }
        // "mil" rather than "um mil"
        if !(index == 1 && *group == 1) {
            spell_below_thousand(*group, &mut parts);
        }
        if let Some(scale) = scale_word(index, *group) {
            parts.push(scale.to_string());
        }
    }

    Some(parts.join(" "))
}

/// Spells a single numeric token (integer or decimal, comma or dot
/// separator). Decimal digits are spelled one by one joined by "vírgula".
/// Returns the token verbatim when it cannot be spelled.
pub fn spell_token(token: &str) -> String {
    let canonical = token.replace(',', ".");
    let mut pieces = canonical.splitn(2, '.');
    let integer_part = pieces.next().unwrap_or_default();
    let fraction_part = pieces.next();

    let Ok(integer) = integer_part.parse::<u64>() else {
        return token.to_string();
    };
    let Some(integer_words) = spell_integer(integer) else {
        return token.to_string();
    };

    match fraction_part {
        None | Some("") => integer_words,
        Some(digits) => {
            let spelled: Option<Vec<&str>> = digits
                .chars()
                .map(|digit| digit.to_digit(10).map(|d| UNITS[d as usize]))
                .collect();
            match spelled {
                Some(words) => format!("{integer_words} vírgula {}", words.join(" ")),
                None => token.to_string(),
            }
        }
    }
}

/// Replaces every numeric token in `text` with its spoken form. Best
/// effort: tokens that fail to spell stay verbatim, and the function never
/// errors.
pub fn numbers_to_words(text: &str) -> String {
    number_pattern()
        .replace_all(text, |captures: &regex::Captures<'_>| spell_token(&captures[0]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spells_small_integers() {
        assert_eq!(spell_integer(0).unwrap(), "zero");
        assert_eq!(spell_integer(7).unwrap(), "sete");
        assert_eq!(spell_integer(15).unwrap(), "quinze");
        assert_eq!(spell_integer(42).unwrap(), "quarenta e dois");
    }

    #[test]
    fn spells_hundreds() {
        assert_eq!(spell_integer(100).unwrap(), "cem");
        assert_eq!(spell_integer(101).unwrap(), "cento e um");
        assert_eq!(spell_integer(250).unwrap(), "duzentos e cinquenta");
        assert_eq!(spell_integer(999).unwrap(), "novecentos e noventa e nove");
    }

    #[test]
    fn spells_thousands_and_beyond() {
        assert_eq!(spell_integer(1000).unwrap(), "mil");
        assert_eq!(spell_integer(2024).unwrap(), "dois mil e vinte e quatro");
        assert_eq!(spell_integer(1_000_000).unwrap(), "um milhão");
        assert_eq!(spell_integer(3_000_000).unwrap(), "três milhões");
    }

    #[test]
    fn spells_decimal_tokens() {
        assert_eq!(spell_token("12,50"), "doze vírgula cinco zero");
        assert_eq!(spell_token("3.14"), "três vírgula um quatro");
    }

    #[test]
    fn unparseable_tokens_stay_verbatim() {
        assert_eq!(spell_token("99999999999999999999"), "99999999999999999999");
    }

    #[test]
    fn replaces_numbers_inside_text() {
        assert_eq!(
            numbers_to_words("custa 42 reais"),
            "custa quarenta e dois reais"
        );
        assert_eq!(numbers_to_words("sem numeros aqui"), "sem numeros aqui");
    }
}
