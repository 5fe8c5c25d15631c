/// Grouping class fixed per operator: elementwise over keys, per-symbol over
/// ascending dates, or per-date across symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Elem,
    Ts,
    Cs,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    ElemAbs,
    ElemSign,
    ElemLog,
    ElemExp,
    ElemSqrt,
    ElemAdd,
    ElemSub,
    ElemMul,
    ElemDiv,
    ElemPow,
    ElemSignedPower,
    ElemWhere,
    ElemFillNa,
    ElemClip,
    ElemLt,
    ElemLe,
    ElemGt,
    ElemGe,
    ElemEq,
    ElemNe,
    ElemAnd,
    ElemOr,
    TsDelay,
    TsDelta,
    TsSum,
    TsMean,
    TsStd,
    TsVar,
    TsMax,
    TsMin,
    TsArgMax,
    TsArgMin,
    TsProduct,
    TsRank,
    TsQuantile,
    TsWma,
    TsEma,
    TsSma,
    TsCorr,
    TsCov,
    TsBeta,
    CsRank,
    CsScale,
    CsZscore,
    CsDemean,
    CsWinsorize,
    CsClipQuantile,
}

impl OpCode {
    pub const COUNT: usize = Self::CsClipQuantile as usize + 1;

    #[inline]
    pub const fn as_usize(self) -> usize {
        self as usize
    }
}
