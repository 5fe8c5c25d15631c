mod common;

use alpha_panel::ops::OpCode;
use alpha_panel::plan::PlanParam;
use alpha_panel::{
    evaluate_batch, Factor, FactorCompiler, FactorDef, FactorError, FieldSpec, PanelCtx,
    PanelVector,
};
use common::*;

const SYMBOLS: [&str; 3] = ["SS600000", "SZ000001", "SS601988"];
const DATES: usize = 40;

fn market_bundle() -> alpha_panel::InputBundle {
    let mut close = synthetic_series(SYMBOLS.len() * DATES);
    let mut volume: Vec<f64> = synthetic_series(SYMBOLS.len() * DATES * 2)
        .into_iter()
        .skip(SYMBOLS.len() * DATES)
        .collect();
    close[7] = f64::NAN;
    volume[13] = f64::NAN;
    bundle_with(&SYMBOLS, DATES, &[("close", close), ("volume", volume)])
}

#[test]
fn momentum_formula_and_routine_agree_byte_for_byte() {
    let bundle = market_bundle();

    let formula = Factor::from_formula("momentum_f", "RANK((CLOSE / DELAY(CLOSE, 20)) - 1)")
        .expect("momentum formula should compile");
    let routine = Factor::from_routine(
        "momentum_r",
        vec![FieldSpec::required("close")],
        |ctx: &PanelCtx<'_>| -> Result<PanelVector, FactorError> {
            let close = ctx.field("close")?;
            let lagged = ctx.delay(&close, 20)?;
            let ratio = ctx.div(&close, &lagged)?;
            let ret = ctx.sub(&ratio, &ctx.constant(1.0))?;
            ctx.rank(&ret)
        },
    );

    let from_formula = formula.calculate(&bundle).expect("formula mode should evaluate");
    let from_routine = routine.calculate(&bundle).expect("routine mode should evaluate");
    assert_bits_eq(from_formula.values(), from_routine.values());
}

#[test]
fn conditional_factors_agree_across_modes() {
    let bundle = market_bundle();

    let formula = Factor::from_formula(
        "signed_volume_f",
        "IF(CLOSE > DELAY(CLOSE, 1), VOLUME, 0 - VOLUME)",
    )
    .expect("conditional formula should compile");
    let routine = Factor::from_routine(
        "signed_volume_r",
        vec![FieldSpec::required("close"), FieldSpec::required("volume")],
        |ctx: &PanelCtx<'_>| -> Result<PanelVector, FactorError> {
            let close = ctx.field("close")?;
            let volume = ctx.field("volume")?;
            let up = ctx.apply(
                OpCode::ElemGt,
                &[&close, &ctx.delay(&close, 1)?],
                PlanParam::None,
            )?;
            let flipped = ctx.sub(&ctx.constant(0.0), &volume)?;
            ctx.select(&up, &volume, &flipped)
        },
    );

    let from_formula = formula.calculate(&bundle).expect("formula mode should evaluate");
    let from_routine = routine.calculate(&bundle).expect("routine mode should evaluate");
    assert_bits_eq(from_formula.values(), from_routine.values());
}

#[test]
fn optional_fields_backfill_identically_across_modes() {
    // Neither bundle carries pe_ratio, so both modes must materialize the
    // declared neutral before the arithmetic runs.
    let bundle = market_bundle();
    let fields = vec![
        FieldSpec::required("close"),
        FieldSpec::optional("pe_ratio", 1.5),
    ];

    let def = FactorDef::formula("cheap_momentum_f", "CLOSE + PE_RATIO").with_fields(fields.clone());
    let formula = Factor::from_def(&FactorCompiler::default(), &def)
        .expect("formula def should compile");
    let routine = Factor::from_routine(
        "cheap_momentum_r",
        fields,
        |ctx: &PanelCtx<'_>| -> Result<PanelVector, FactorError> {
            let close = ctx.field("close")?;
            let pe = ctx.field("pe_ratio")?;
            ctx.add(&close, &pe)
        },
    );

    let from_formula = formula.calculate(&bundle).expect("formula mode should evaluate");
    let from_routine = routine.calculate(&bundle).expect("routine mode should evaluate");
    assert_bits_eq(from_formula.values(), from_routine.values());
}

#[test]
fn batch_results_match_serial_calculation() {
    let bundle = market_bundle();
    let factors = vec![
        Factor::from_formula("mom", "RANK((CLOSE / DELAY(CLOSE, 20)) - 1)")
            .expect("momentum should compile"),
        Factor::from_routine(
            "spread",
            vec![FieldSpec::required("close")],
            |ctx: &PanelCtx<'_>| -> Result<PanelVector, FactorError> {
                let close = ctx.field("close")?;
                ctx.scale(&ctx.sub(&ctx.mean(&close, 5)?, &close)?)
            },
        ),
        Factor::from_formula("turnover_z", "ZSCORE(VOLUME, 10)")
            .expect("zscore formula should compile"),
    ];

    let serial: Vec<PanelVector> = factors
        .iter()
        .map(|f| f.calculate(&bundle).expect("serial evaluation should succeed"))
        .collect();
    let batched = evaluate_batch(&factors, &bundle);

    assert_eq!(batched.len(), serial.len());
    for (got, want) in batched.iter().zip(&serial) {
        let got = got.as_ref().expect("batch evaluation should succeed");
        assert_bits_eq(got.values(), want.values());
    }
}
