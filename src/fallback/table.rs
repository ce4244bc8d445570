//! Built-in next-token table used when the suggestion service is unreachable.
//!
//! Layout: context id → last token → candidates.  The `default` key at the
//! token level is the context's answer for unknown tokens; the `default`
//! context is the global table used for unknown contexts.

/// Sentinel key at both levels of the table.
pub const DEFAULT_KEY: &str = "default";

/// Last-resort candidates if a table somehow has no global default entry.
pub const FLOOR: &[&str] = &["네", "아니오", "감사합니다", "죄송합니다", "부탁드립니다"];

type Entries = &'static [(&'static str, &'static [&'static str])];

pub(crate) const BUILTIN: &[(&str, Entries)] = &[
    (
        "restaurant",
        &[
            ("저는", &["비빔밥을", "불고기를", "주문할게요", "주세요"]),
            ("불고기", &["주세요", "랑", "정식을", "세트를"]),
            ("비빔밥", &["주세요", "이", "을", "랑"]),
            ("메뉴", &["추천해", "좀", "보여", "주세요"]),
            (DEFAULT_KEY, &["주세요", "랑", "을", "이", "감사합니다"]),
        ],
    ),
    (
        "hospital",
        &[
            ("머리가", &["아파요", "아프고", "멍해요", "어지러워요"]),
            ("배가", &["아파요", "아프고", "불편해요", "메스꺼워요"]),
            ("다리가", &["아파요", "붓고", "저려요", "불편해요"]),
            (DEFAULT_KEY, &["아파요", "불편해요", "때문에", "왔어요", "하고"]),
        ],
    ),
    (
        "classroom",
        &[
            ("이해가", &["안", "잘", "되지", "됐어요"]),
            ("질문이", &["있습니다", "있어요", "좀", "하나"]),
            ("예제를", &["더", "보여주세요", "설명해주세요", "이해했어요"]),
            ("설명을", &["부탁드립니다", "다시", "해주세요", "이해했어요"]),
            (
                DEFAULT_KEY,
                &["해주세요", "주세요", "부탁드립니다", "있어요", "감사합니다"],
            ),
        ],
    ),
    (
        DEFAULT_KEY,
        &[
            ("도움이", &["필요해요", "좀", "주세요", "감사합니다"]),
            ("안녕하세요", &["저는", "도움이", "필요해요", "감사합니다"]),
            (
                DEFAULT_KEY,
                &["네", "아니오", "감사합니다", "부탁드립니다", "죄송합니다"],
            ),
        ],
    ),
];
