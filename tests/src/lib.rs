//! Properties that span the compiler and runtime crates.

#[cfg(test)]
mod automata;
#[cfg(test)]
mod backends;
#[cfg(test)]
mod behavior;
#[cfg(test)]
mod errors;
#[cfg(test)]
mod scheduling;

/// Every string over `alphabet` of length at most `max_len`, shortest first.
#[cfg(test)]
pub(crate) fn strings_up_to(alphabet: &[char], max_len: usize) -> Vec<String> {
    let mut all = vec![String::new()];
    let mut previous = vec![String::new()];

    for _ in 0..max_len {
        previous = previous
            .iter()
            .flat_map(|prefix| {
                alphabet.iter().map(move |c| {
                    let mut next = prefix.clone();
                    next.push(*c);
                    next
                })
            })
            .collect();
        all.extend(previous.iter().cloned());
    }

    all
}
