// tests/quoting_props.rs
use dwi_connectome::workflow::shell_quote;
use proptest::prelude::*;

/// Reads one bash word made of bare characters, backslash escapes and
/// single-quoted runs. `None` if the word would split or stay open.
fn bash_word(word: &str) -> Option<String> {
  let mut out = String::new();
  let mut chars = word.chars();
  while let Some(c) = chars.next() {
    match c {
      '\'' => loop {
        match chars.next()? {
          '\'' => break,
          inner => out.push(inner),
        }
      },
      '\\' => out.push(chars.next()?),
      c if c.is_whitespace() || "\"$`;&|<>()*?![]{}~#".contains(c) => return None,
      c => out.push(c),
    }
  }
  Some(out)
}

proptest! {
  #[test]
  fn quoted_argument_is_one_word(arg in any::<String>()) {
    prop_assert_eq!(bash_word(&shell_quote(&arg)), Some(arg));
  }

  #[test]
  fn plain_paths_pass_through(arg in "[A-Za-z0-9_./-]{1,40}") {
    prop_assert_eq!(shell_quote(&arg), arg);
  }
}
