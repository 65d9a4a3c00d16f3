use entangle_decl::Fundamental;

/// Size and alignment in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

impl Layout {
    pub const fn new(size: u64, align: u64) -> Self {
        Self { size, align }
    }
}

/// Data model of the platform the generated module will load the library on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetAbi {
    pub pointer: Layout,
    pub long_size: u64,
    pub wchar_size: u64,
    pub long_double: Layout,
    /// Alignment of `long long` (and 8-byte `long`) inside structs.
    pub int64_align: u64,
    pub double_align: u64,
}

impl TargetAbi {
    /// x86-64 and AArch64 Linux.
    pub const LP64: Self = Self {
        pointer: Layout::new(8, 8),
        long_size: 8,
        wchar_size: 4,
        long_double: Layout::new(16, 16),
        int64_align: 8,
        double_align: 8,
    };

    /// 64-bit Windows.
    pub const LLP64: Self = Self {
        pointer: Layout::new(8, 8),
        long_size: 4,
        wchar_size: 2,
        long_double: Layout::new(8, 8),
        int64_align: 8,
        double_align: 8,
    };

    /// 32-bit x86 Linux.
    pub const ILP32: Self = Self {
        pointer: Layout::new(4, 4),
        long_size: 4,
        wchar_size: 4,
        long_double: Layout::new(12, 4),
        int64_align: 4,
        double_align: 4,
    };

    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Self::LLP64
        } else if cfg!(target_pointer_width = "32") {
            Self::ILP32
        } else if cfg!(all(target_vendor = "apple", target_arch = "aarch64")) {
            Self {
                long_double: Layout::new(8, 8),
                ..Self::LP64
            }
        } else {
            Self::LP64
        }
    }

    /// `None` for `void`, which has no layout.
    pub fn fundamental(&self, kind: Fundamental) -> Option<Layout> {
        let layout = match kind {
            Fundamental::Void => return None,
            Fundamental::Bool | Fundamental::Char | Fundamental::SChar | Fundamental::UChar => {
                Layout::new(1, 1)
            }
            Fundamental::WChar => Layout::new(self.wchar_size, self.wchar_size),
            Fundamental::Char16 | Fundamental::Short | Fundamental::UShort => Layout::new(2, 2),
            Fundamental::Char32 | Fundamental::Int | Fundamental::UInt | Fundamental::Float => {
                Layout::new(4, 4)
            }
            Fundamental::Long | Fundamental::ULong => match self.long_size {
                8 => Layout::new(8, self.int64_align),
                size => Layout::new(size, size),
            },
            Fundamental::LongLong | Fundamental::ULongLong => Layout::new(8, self.int64_align),
            Fundamental::Double => Layout::new(8, self.double_align),
            Fundamental::LongDouble => self.long_double,
        };
        Some(layout)
    }
}

impl Default for TargetAbi {
    fn default() -> Self {
        Self::host()
    }
}
