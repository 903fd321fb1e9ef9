use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::NamedTempFile;
use xlsxstream::{Cell, SheetOptions, SheetWriter, XlsxWriter};

fn benchmark_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    group.sample_size(10);

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                let mut writer = XlsxWriter::new(temp.path()).unwrap();

                writer.write_row(["ID", "Name", "Value"]).unwrap();
                for i in 0..size {
                    writer
                        .write_row_typed(&[
                            Cell::new(i),
                            Cell::new(format!("Name_{}", i)),
                            Cell::new(i as f64 * 1.5),
                        ])
                        .unwrap();
                }

                writer.save().unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_sheet_xml(c: &mut Criterion) {
    let mut group = c.benchmark_group("sheet_xml");
    group.sample_size(10);

    for buffer_size in [512usize, 4096, 65536].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(buffer_size),
            buffer_size,
            |b, &buffer_size| {
                b.iter(|| {
                    let mut sheet = SheetWriter::with_options(
                        std::io::sink(),
                        SheetOptions {
                            buffer_size,
                            ..SheetOptions::default()
                        },
                    )
                    .unwrap();
                    for i in 0..10_000 {
                        sheet
                            .write_row(&[
                                Cell::new(i),
                                Cell::new("some <escaped> & text"),
                                Cell::new(i % 2 == 0),
                            ])
                            .unwrap();
                    }
                    black_box(sheet.finish().unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_write, benchmark_sheet_xml);
criterion_main!(benches);
