#[cfg(test)]
mod helpers;
