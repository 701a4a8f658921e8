//! 命令行输出

pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

pub fn print_info(message: &str) {
    println!("📋 {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// 按列宽对齐输出表格
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", render(headers.to_vec()));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in rows {
        println!("{}", render(row.iter().map(String::as_str).collect()));
    }
}
