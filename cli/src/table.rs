// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, marker::PhantomData};

use colored::{Color, Colorize};
use unicode_width::UnicodeWidthStr;

/// Column-aligned rows, one per item.
#[derive(Debug)]
pub struct Table<'a, T, C: Column<T>> {
    columns: &'a [C],
    data: &'a [T],
    separator: &'a str,
}

impl<'a, T, C: Column<T>> Table<'a, T, C> {
    pub fn new(columns: &'a [C], data: &'a [T]) -> Self {
        Self {
            columns,
            data,
            separator: "  ",
        }
    }

    fn stylizers(&self, table: &[Vec<String>]) -> Vec<ColumnStylizer<'a, T, C>> {
        let widths = column_widths(table, self.columns.len());
        let last = self.columns.len().saturating_sub(1);
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let direction = col.padding_direction();
                // Trailing left-aligned column needs no padding
                let padding = if i == last && direction == PaddingDirection::Left {
                    None
                } else {
                    Some((widths.get(i).copied().unwrap_or(0), direction))
                };
                ColumnStylizer {
                    column: col,
                    padding,
                    _marker: PhantomData,
                }
            })
            .collect()
    }
}

impl<T, C: Column<T>> fmt::Display for Table<'_, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table: Vec<Vec<String>> = self
            .data
            .iter()
            .map(|item| self.columns.iter().map(|col| col.format(item)).collect())
            .collect();

        let stylizers = self.stylizers(&table);
        for (i, (cells, item)) in table.into_iter().zip(self.data).enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for (j, (col, cell)) in stylizers.iter().zip(cells).enumerate() {
                if j > 0 {
                    write!(f, "{}", self.separator)?;
                }
                write!(f, "{}", col.stylize_cell(item, cell))?;
            }
        }
        Ok(())
    }
}

pub trait Column<T> {
    fn format(&self, data: &T) -> String;

    fn padding_direction(&self) -> PaddingDirection {
        PaddingDirection::Left
    }

    fn color(&self, _data: &T) -> Option<Color> {
        None
    }
}

#[derive(Debug)]
struct ColumnStylizer<'a, T, C: Column<T>> {
    column: &'a C,
    /// padding width and direction
    padding: Option<(usize, PaddingDirection)>,
    _marker: PhantomData<T>,
}

impl<T, C: Column<T>> ColumnStylizer<'_, T, C> {
    fn stylize_cell(&self, data: &T, cell: String) -> String {
        let cell = match self.padding {
            Some((width, direction)) => pad(&cell, width, direction),
            None => cell,
        };

        match self.column.color(data) {
            Some(color) => cell.color(color).to_string(),
            None => cell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingDirection {
    Left,
    Right,
}

/// Pads by display width, so wide characters line up.
fn pad(cell: &str, width: usize, direction: PaddingDirection) -> String {
    let fill = " ".repeat(width.saturating_sub(cell.width()));
    match direction {
        PaddingDirection::Left => format!("{cell}{fill}"),
        PaddingDirection::Right => format!("{fill}{cell}"),
    }
}

fn column_widths(table: &[Vec<String>], columns: usize) -> Vec<usize> {
    let mut widths = vec![0; columns];
    for row in table {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }
    widths
}
