//! Minimal edit scripts between two token sequences.
//!
//! Only deletions and additions are reported; a substitution surfaces as a
//! delete followed by an add.

use serde::Serialize;

use crate::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation<T> {
    /// `index` is the token's position in the `before` sequence.
    Delete { index: usize, token: T },
    /// `index` is the token's position in the `after` sequence.
    Add { index: usize, token: T },
}

impl<T> EditOperation<T> {
    pub fn token(&self) -> &T {
        match self {
            Self::Delete { token, .. } | Self::Add { token, .. } => token,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, Self::Add { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alignment<T> {
    pub distance: usize,
    pub operations: Vec<EditOperation<T>>,
}

/// Levenshtein distance and edit script turning `before` into `after`,
/// operations in forward order.
pub fn align<T: PartialEq + Clone>(
    before: &[T],
    after: &[T],
) -> Result<Alignment<T>, AnalysisError> {
    if before.is_empty() || after.is_empty() {
        let operations = before
            .iter()
            .enumerate()
            .map(|(index, token)| EditOperation::Delete {
                index,
                token: token.clone(),
            })
            .chain(after.iter().enumerate().map(|(index, token)| EditOperation::Add {
                index,
                token: token.clone(),
            }))
            .collect::<Vec<_>>();
        return Ok(Alignment {
            distance: operations.len(),
            operations,
        });
    }

    let matrix = distance_matrix(before, after);
    let distance = matrix[before.len()][after.len()];
    let operations = backtrace(&matrix, before, after);

    if distance > 0 && operations.is_empty() {
        return Err(AnalysisError::EmptyEditScript { distance });
    }
    Ok(Alignment {
        distance,
        operations,
    })
}

fn distance_matrix<T: PartialEq>(before: &[T], after: &[T]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; after.len() + 1]; before.len() + 1];
    for (row, cells) in matrix.iter_mut().enumerate() {
        cells[0] = row;
    }
    for (col, cell) in matrix[0].iter_mut().enumerate() {
        *cell = col;
    }

    for row in 1..=before.len() {
        for col in 1..=after.len() {
            matrix[row][col] = if before[row - 1] == after[col - 1] {
                matrix[row - 1][col - 1]
            } else {
                1 + matrix[row - 1][col]
                    .min(matrix[row][col - 1])
                    .min(matrix[row - 1][col - 1])
            };
        }
    }
    matrix
}

fn backtrace<T: PartialEq + Clone>(
    matrix: &[Vec<usize>],
    before: &[T],
    after: &[T],
) -> Vec<EditOperation<T>> {
    // Collected from the end, reversed at the end.
    let mut reversed = Vec::new();
    let (mut row, mut col) = (before.len(), after.len());

    while row > 0 || col > 0 {
        let current = matrix[row][col];
        let delete = |reversed: &mut Vec<EditOperation<T>>, row: usize| {
            reversed.push(EditOperation::Delete {
                index: row - 1,
                token: before[row - 1].clone(),
            });
        };
        let add = |reversed: &mut Vec<EditOperation<T>>, col: usize| {
            reversed.push(EditOperation::Add {
                index: col - 1,
                token: after[col - 1].clone(),
            });
        };

        if row == 0 {
            add(&mut reversed, col);
            col -= 1;
            continue;
        }
        if col == 0 {
            delete(&mut reversed, row);
            row -= 1;
            continue;
        }
        if before[row - 1] == after[col - 1] && matrix[row - 1][col - 1] == current {
            row -= 1;
            col -= 1;
            continue;
        }

        if matrix[row - 1][col] + 1 == current {
            delete(&mut reversed, row);
            row -= 1;
        } else if matrix[row][col - 1] + 1 == current {
            add(&mut reversed, col);
            col -= 1;
        } else {
            add(&mut reversed, col);
            delete(&mut reversed, row);
            row -= 1;
            col -= 1;
        }
    }

    reversed.reverse();
    reversed
}
