//! Zentrale Bitbreiten-Berechnung.
//!
//! Berechnet `⌈log₂(n)⌉` — die Anzahl Bits, um `n` unterschiedliche Werte zu
//! codieren. Wird von Event Codes und allen String-Table-Partitionen
//! verwendet. Die Breite MUSS auf beiden Seiten aus der Tabellengröße VOR dem
//! Anfügen eines neuen Eintrags berechnet werden, sonst divergieren Encoder
//! und Decoder.

/// Anzahl Bits für `n` unterschiedliche Werte: `⌈log₂(n)⌉`.
///
/// - `n = 0` oder `n = 1`: 0 Bits
/// - `n = 2`: 1 Bit
/// - `n = 3..4`: 2 Bits, usw.
#[inline]
pub fn for_count(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

/// Breite eines Level-Codes mit `n` expliziten Alternativen und optionalem
/// Escape-Codepunkt in das nächste Level.
#[inline]
pub fn for_level(n: usize, has_next_level: bool) -> u8 {
    for_count(n + usize::from(has_next_level))
}
