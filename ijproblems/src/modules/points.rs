use anyhow::Result;

/// コンテスト種別の数(0: 国内予選, 1: アジア地区予選)
pub const NUMBER_OF_CONTEST_TYPES: usize = 2;

/// Point value of each level, indexed by `level - 1`.
/// Values grow with difficulty and are strictly increasing within a table.
static POINTS: [&[i64]; NUMBER_OF_CONTEST_TYPES] = [
    &[20, 30, 50, 70, 100, 150, 200, 250, 300, 400],
    &[30, 50, 80, 120, 170, 230, 300, 400, 550, 700, 900, 1200],
];

/// Upper bound of the performance score of each level, indexed by `level - 1`.
/// The final bound must dominate every attainable performance value.
static PERFORMANCE_UPPER_BOUNDS: [&[i64]; NUMBER_OF_CONTEST_TYPES] = [
    &[400, 800, 1200, 1600, 2000, 2400, 2800, 3200, 3600, 100000],
    &[
        400, 700, 1000, 1300, 1600, 1900, 2200, 2500, 2800, 3100, 3400, 100000,
    ],
];

pub fn contest_type_index(contest_type: i32) -> Option<usize> {
    usize::try_from(contest_type)
        .ok()
        .filter(|index| *index < NUMBER_OF_CONTEST_TYPES)
}

/// ポイント表を返すメソッド。未知のコンテスト種別にはNoneを返す
pub fn points(contest_type: i32) -> Option<&'static [i64]> {
    contest_type_index(contest_type).map(|index| POINTS[index])
}

/// パフォーマンス値をレベルへ変換するメソッド
///
/// レベルは`perf`以上の最初の上限値の1始まりの位置。どの上限値も
/// `perf`に届かない場合はポイント表の設定自体が不完全なので、読み捨てずに
/// エラーで打ち切る。
pub fn level_from_performance(contest_type: i32, perf: i64) -> Result<i32> {
    let bounds = match contest_type_index(contest_type) {
        Some(index) => PERFORMANCE_UPPER_BOUNDS[index],
        None => anyhow::bail!("unknown contest type: {}", contest_type),
    };

    for (index, bound) in bounds.iter().enumerate() {
        if perf <= *bound {
            return Ok(index as i32 + 1);
        }
    }

    anyhow::bail!(
        "performance {} exceeds every upper bound of contest type {}",
        perf,
        contest_type
    )
}
